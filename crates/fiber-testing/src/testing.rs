use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fiber_core::{
    CommitReport, Deadline, Engine, EngineError, FixedDeadline, Host, HostError, IdleScheduler,
    Listener, MemoryHost, NodeId, PropValue, Props, Runtime, SliceOutcome, Tag,
};

/// One call made through the [`Host`] trait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    Create { node: NodeId, tag: String },
    SetProperty { node: NodeId, name: String, value: String },
    RemoveProperty { node: NodeId, name: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
    AppendChild { parent: NodeId, child: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
}

impl HostOp {
    /// Node the operation acts on; the parent for structural operations.
    pub fn target(&self) -> NodeId {
        match self {
            HostOp::Create { node, .. }
            | HostOp::SetProperty { node, .. }
            | HostOp::RemoveProperty { node, .. }
            | HostOp::AddListener { node, .. }
            | HostOp::RemoveListener { node, .. } => *node,
            HostOp::AppendChild { parent, .. } | HostOp::RemoveChild { parent, .. } => *parent,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, HostOp::AppendChild { .. } | HostOp::RemoveChild { .. })
    }
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostOp::Create { node, tag } => write!(f, "create [{node}] {tag}"),
            HostOp::SetProperty { node, name, value } => write!(f, "set [{node}] {name}={value}"),
            HostOp::RemoveProperty { node, name } => write!(f, "unset [{node}] {name}"),
            HostOp::AddListener { node, event } => write!(f, "listen [{node}] @{event}"),
            HostOp::RemoveListener { node, event } => write!(f, "unlisten [{node}] @{event}"),
            HostOp::AppendChild { parent, child } => write!(f, "append [{parent}] <- [{child}]"),
            HostOp::RemoveChild { parent, child } => write!(f, "remove [{parent}] -> [{child}]"),
        }
    }
}

/// [`MemoryHost`] that logs every operation it receives.
#[derive(Default)]
pub struct RecordingHost {
    memory: MemoryHost,
    ops: Vec<HostOp>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container nodes are created on the inner host and are not recorded.
    pub fn create_container(&mut self) -> NodeId {
        self.memory.create_container()
    }

    pub fn memory(&self) -> &MemoryHost {
        &self.memory
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Nodes created by the recorded operations.
    pub fn created(&self) -> Vec<NodeId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                HostOp::Create { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    /// Recorded operations that touched a node which existed before the
    /// recording started, i.e. anything a user could observe.
    pub fn visible_ops(&self) -> Vec<HostOp> {
        let created = self.created();
        self.ops
            .iter()
            .filter(|op| op.is_structural() || !created.contains(&op.target()))
            .cloned()
            .collect()
    }
}

impl Host for RecordingHost {
    fn create_node(&mut self, tag: &Tag, props: &Props) -> Result<NodeId, HostError> {
        let node = self.memory.create_node(tag, props)?;
        self.ops.push(HostOp::Create {
            node,
            tag: tag.to_string(),
        });
        Ok(node)
    }

    fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        self.memory.set_property(node, name, value)?;
        self.ops.push(HostOp::SetProperty {
            node,
            name: name.to_owned(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), HostError> {
        self.memory.remove_property(node, name)?;
        self.ops.push(HostOp::RemoveProperty {
            node,
            name: name.to_owned(),
        });
        Ok(())
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError> {
        self.memory.add_listener(node, event, listener)?;
        self.ops.push(HostOp::AddListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn remove_listener(
        &mut self,
        node: NodeId,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError> {
        self.memory.remove_listener(node, event, listener)?;
        self.ops.push(HostOp::RemoveListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.memory.append_child(parent, child)?;
        self.ops.push(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.memory.remove_child(parent, child)?;
        self.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }
}

/// Deadline that hands out a scripted sequence of remaining times.
///
/// Once the script runs out every read reports zero.
#[derive(Debug, Default)]
pub struct ScriptedDeadline {
    script: RefCell<VecDeque<Duration>>,
    reads: Cell<usize>,
}

impl ScriptedDeadline {
    pub fn new(script: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            script: RefCell::new(script.into_iter().collect()),
            reads: Cell::new(0),
        }
    }

    /// Lets exactly `units` units of work run under the default threshold.
    pub fn units(units: usize) -> Self {
        Self::new(std::iter::repeat(Duration::from_millis(50)).take(units.saturating_sub(1)))
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl Deadline for ScriptedDeadline {
    fn time_remaining(&self) -> Duration {
        self.reads.set(self.reads.get() + 1);
        self.script.borrow_mut().pop_front().unwrap_or(Duration::ZERO)
    }
}

/// Scheduler that only counts slice requests.
#[derive(Debug, Default)]
pub struct CountingScheduler {
    requests: AtomicUsize,
}

impl CountingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl IdleScheduler for CountingScheduler {
    fn request_idle_slice(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Engine over a [`RecordingHost`] with one empty container, plus the
/// scheduler its runtime reports to.
pub fn engine_with_recorder() -> (Engine<RecordingHost>, NodeId, Arc<CountingScheduler>) {
    let mut host = RecordingHost::new();
    let container = host.create_container();
    let scheduler = CountingScheduler::new();
    let engine = Engine::with_runtime(host, Runtime::new(scheduler.clone()));
    (engine, container, scheduler)
}

/// Engine over a plain [`MemoryHost`] with one empty container.
pub fn engine_with_memory() -> (Engine<MemoryHost>, NodeId) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    (Engine::new(host), container)
}

/// Runs generous slices until a pass commits and returns its report.
///
/// # Panics
///
/// Panics when the engine settles without committing.
pub fn run_to_commit<H: Host>(engine: &mut Engine<H>) -> Result<CommitReport, EngineError> {
    let deadline = FixedDeadline(Duration::from_secs(1));
    for _ in 0..10_000 {
        match engine.work_loop(&deadline)? {
            SliceOutcome::Committed { .. } => {
                return Ok(engine.last_commit().cloned().unwrap_or_default());
            }
            SliceOutcome::Suspended { .. } => {}
            SliceOutcome::Idle => panic!("engine went idle without committing"),
        }
    }
    panic!("no commit after 10000 slices");
}

/// Runs slices until nothing is pending; returns how many ran.
pub fn settle<H: Host>(
    engine: &mut Engine<H>,
    deadline: &dyn Deadline,
) -> Result<usize, EngineError> {
    let mut slices = 0;
    while engine.has_pending_work() {
        engine.work_loop(deadline)?;
        slices += 1;
        assert!(slices < 10_000, "engine did not settle");
    }
    Ok(slices)
}
