use std::fmt::Write as _;
use std::rc::Rc;
use std::sync::Arc;

use crate::collections::map::HashSet;
use crate::commit::CommitReport;
use crate::element::{Element, Props};
use crate::fiber::{EffectTag, Fiber, FiberArena, FiberId, FiberKind};
use crate::host::Host;
use crate::options::EngineOptions;
use crate::runtime::{DefaultScheduler, Runtime, RuntimeHandle};
use crate::NodeId;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub passes_started: u64,
    pub passes_abandoned: u64,
    pub units_performed: u64,
    pub commits: u64,
}

/// Owns the fiber trees of one render root and the host they are applied to.
///
/// At most one pass is in flight. Its resumable state is exactly
/// `next_unit_of_work` plus `work_in_progress_root`; starting another pass
/// drops both and frees the fibers the abandoned pass allocated.
pub struct Engine<H: Host> {
    pub(crate) host: H,
    pub(crate) fibers: FiberArena,
    pub(crate) runtime: Runtime,
    pub(crate) options: EngineOptions,
    pub(crate) next_unit: Option<FiberId>,
    pub(crate) wip_root: Option<FiberId>,
    pub(crate) current_root: Option<FiberId>,
    pub(crate) deletions: HashSet<FiberId>,
    pub(crate) wip_fibers: Vec<FiberId>,
    pub(crate) committed_fibers: Vec<FiberId>,
    pub(crate) last_commit: Option<CommitReport>,
    pub(crate) stats: EngineStats,
}

impl<H: Host> Engine<H> {
    pub fn new(host: H) -> Self {
        Self::with_runtime(host, Runtime::new(Arc::new(DefaultScheduler)))
    }

    pub fn with_runtime(host: H, runtime: Runtime) -> Self {
        Self {
            host,
            fibers: FiberArena::new(),
            runtime,
            options: EngineOptions::default(),
            next_unit: None,
            wip_root: None,
            current_root: None,
            deletions: HashSet::new(),
            wip_fibers: Vec::new(),
            committed_fibers: Vec::new(),
            last_commit: None,
            stats: EngineStats::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Starts a render pass that reconciles `element` into `container`.
    ///
    /// Nothing is applied to the host until the work loop has visited every
    /// fiber of the pass. Asks the scheduler for an idle slice.
    pub fn render(&mut self, element: Element, container: NodeId) {
        let props = Props::from_children(vec![element]);
        self.start_pass(container, Rc::new(props));
        self.runtime.request_idle_slice();
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn fiber(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub fn current_root(&self) -> Option<FiberId> {
        self.current_root
    }

    pub fn work_in_progress_root(&self) -> Option<FiberId> {
        self.wip_root
    }

    pub fn next_unit_of_work(&self) -> Option<FiberId> {
        self.next_unit
    }

    /// Report of the most recent commit.
    pub fn last_commit(&self) -> Option<&CommitReport> {
        self.last_commit.as_ref()
    }

    /// Whether a pass is in flight or a state update is waiting for one.
    pub fn has_pending_work(&self) -> bool {
        self.wip_root.is_some() || self.runtime.has_render_request()
    }

    /// Live fibers across the committed tree and the pass in flight.
    pub fn fiber_count(&self) -> usize {
        self.fibers.len()
    }

    pub(crate) fn alloc_fiber(&mut self, fiber: Fiber) -> FiberId {
        let id = self.fibers.alloc(fiber);
        self.wip_fibers.push(id);
        id
    }

    fn start_pass(&mut self, container: NodeId, props: Rc<Props>) {
        self.abandon_in_flight();
        // The new pass folds every queued update through its alternate.
        self.runtime.take_render_request();
        let mut root = Fiber::new(FiberKind::Root, props);
        root.host = Some(container);
        root.alternate = self.current_root;
        let root = self.alloc_fiber(root);
        self.wip_root = Some(root);
        self.next_unit = Some(root);
        self.stats.passes_started += 1;
        log::debug!(
            "render pass started at {root} (alternate {:?})",
            self.current_root
        );
    }

    /// Starts a pass from the committed root, or re-seeds the first pass if
    /// nothing has been committed yet.
    pub(crate) fn restart_from_current(&mut self) {
        let seed = self
            .current_root
            .or(self.wip_root)
            .and_then(|id| self.fibers.get(id))
            .and_then(|root| root.host.map(|host| (host, Rc::clone(&root.props))));
        match seed {
            Some((container, props)) => self.start_pass(container, props),
            None => log::debug!("render requested before any root was rendered; ignored"),
        }
    }

    pub(crate) fn abandon_in_flight(&mut self) {
        for id in self.deletions.drain() {
            if let Some(fiber) = self.fibers.get_mut(id) {
                fiber.effect = EffectTag::None;
            }
        }
        if self.wip_root.take().is_some() {
            self.stats.passes_abandoned += 1;
            log::debug!(
                "abandoning in-flight pass ({} fibers)",
                self.wip_fibers.len()
            );
        }
        for id in self.wip_fibers.drain(..) {
            self.fibers.free(id);
        }
        self.next_unit = None;
    }

    /// Indented listing of a fiber tree: label, effect and host node.
    pub fn dump_fiber_tree(&self, root: Option<FiberId>) -> String {
        let mut output = String::new();
        let Some(root) = root else {
            output.push_str("(no root)\n");
            return output;
        };
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(fiber) = self.fibers.get(id) else {
                let _ = writeln!(output, "{}{id} (missing)", "  ".repeat(depth));
                continue;
            };
            let indent = "  ".repeat(depth);
            let _ = write!(output, "{indent}{} {:?}", fiber.kind.label(), fiber.effect);
            if let Some(node) = fiber.host {
                let _ = write!(output, " node={node}");
            }
            output.push('\n');
            let children: Vec<FiberId> = self.fibers.siblings(fiber.child).collect();
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{host, Child};
    use crate::host::MemoryHost;
    use crate::platform::FixedDeadline;
    use crate::scheduler::SliceOutcome;
    use std::time::Duration;

    fn engine() -> (Engine<MemoryHost>, NodeId) {
        let mut memory = MemoryHost::new();
        let container = memory.create_container();
        (Engine::new(memory), container)
    }

    #[test]
    fn render_request_without_a_root_is_ignored() {
        let (mut engine, _) = engine();
        engine.runtime_handle().request_render();
        assert!(engine.has_pending_work());
        let outcome = engine.work_loop(&FixedDeadline(Duration::from_millis(5)));
        assert_eq!(outcome, Ok(SliceOutcome::Idle));
        assert!(!engine.has_pending_work());
        assert_eq!(engine.stats().passes_started, 0);
    }

    #[test]
    fn dump_fiber_tree_shows_pending_effects() {
        let (mut engine, container) = engine();
        assert_eq!(engine.dump_fiber_tree(None), "(no root)\n");
        let list = host("ul", Props::new(), [Child::from("a"), Child::from("b")]);
        engine.render(list, container);
        while engine.perform_next_unit().unwrap().is_some() {}
        assert_eq!(
            engine.dump_fiber_tree(engine.work_in_progress_root()),
            "#root None node=0\n  ul Placement\n    TEXT Placement\n    TEXT Placement\n"
        );
    }
}
