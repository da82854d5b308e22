//! Per-fiber work: expanding components, preparing host nodes, and diffing
//! a fiber's children against the previous committed chain.
//!
//! The diff is positional. The n-th new element is compared with the n-th
//! old fiber and nothing else; there is no keyed matching. Reordering a list
//! whose kinds stay in the same positional order is therefore reported as
//! updates in place, and state and host nodes follow the position rather
//! than the moved item.

use std::rc::Rc;

use crate::element::{Component, Element};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::fiber::{EffectTag, Fiber, FiberId, FiberKind};
use crate::hooks::{with_hook_frame, HookFrame};
use crate::host::Host;

impl<H: Host> Engine<H> {
    /// Performs the unit of work at `next_unit_of_work` and advances it.
    ///
    /// Returns the new next unit. Does not commit; the work loop does that
    /// once the pass has no unit left.
    pub fn perform_next_unit(&mut self) -> Result<Option<FiberId>, EngineError> {
        let Some(unit) = self.next_unit else {
            return Ok(None);
        };
        self.next_unit = self.perform_unit_of_work(unit)?;
        Ok(self.next_unit)
    }

    /// Processes one fiber and returns the next in depth-first order.
    ///
    /// Components are invoked with their hook frame first. Either way the
    /// fiber's children are then reconciled against its alternate. The host
    /// is never touched here.
    pub fn perform_unit_of_work(
        &mut self,
        id: FiberId,
    ) -> Result<Option<FiberId>, EngineError> {
        let kind = self
            .fibers
            .get(id)
            .ok_or(EngineError::MissingFiber { id })?
            .kind
            .clone();
        log::trace!("unit of work {id} ({})", kind.label());
        match kind {
            FiberKind::Component(component) => self.update_component(id, &component)?,
            FiberKind::Root | FiberKind::Host(_) => self.update_host(id)?,
        }
        self.stats.units_performed += 1;
        Ok(self.fibers.next_in_subtree(id, None))
    }

    fn update_component(&mut self, id: FiberId, component: &Component) -> Result<(), EngineError> {
        let fiber = self.fibers.get(id).ok_or(EngineError::MissingFiber { id })?;
        let props = Rc::clone(&fiber.props);
        let previous = fiber
            .alternate
            .and_then(|alternate| self.fibers.get(alternate))
            .map(|alternate| alternate.hooks.clone())
            .unwrap_or_default();

        let frame = HookFrame::new(previous, self.runtime.handle(), component.name());
        let (element, cells) = with_hook_frame(frame, || component.render(&props));

        self.fibers
            .get_mut(id)
            .ok_or(EngineError::MissingFiber { id })?
            .hooks = cells;
        self.reconcile_children(id, std::slice::from_ref(&element))
    }

    fn update_host(&mut self, id: FiberId) -> Result<(), EngineError> {
        let props = self
            .fibers
            .get(id)
            .map(|fiber| Rc::clone(&fiber.props))
            .ok_or(EngineError::MissingFiber { id })?;
        self.reconcile_children(id, props.children())
    }

    /// Builds the new child chain of `parent` from `elements`, walking the
    /// alternate's child chain in lockstep.
    pub(crate) fn reconcile_children(
        &mut self,
        parent: FiberId,
        elements: &[Element],
    ) -> Result<(), EngineError> {
        let mut old = self
            .fibers
            .get(parent)
            .ok_or(EngineError::MissingFiber { id: parent })?
            .alternate
            .and_then(|alternate| self.fibers.get(alternate))
            .and_then(|alternate| alternate.child);
        let mut previous: Option<FiberId> = None;
        let mut index = 0;

        while index < elements.len() || old.is_some() {
            let element = elements.get(index);
            let old_fiber = old.and_then(|id| self.fibers.get(id).map(|fiber| (id, fiber)));
            let same_kind = match (element, old_fiber) {
                (Some(element), Some((_, fiber))) => fiber.kind.matches(element.kind()),
                _ => false,
            };

            let new_fiber = match (element, old_fiber) {
                (Some(element), Some((old_id, old_fiber))) if same_kind => {
                    let mut fiber = Fiber::new(old_fiber.kind.clone(), Rc::clone(element.props()));
                    fiber.host = old_fiber.host;
                    fiber.alternate = Some(old_id);
                    fiber.effect = EffectTag::Update;
                    Some(fiber)
                }
                (Some(element), _) => {
                    let mut fiber =
                        Fiber::new(element.kind().clone().into(), Rc::clone(element.props()));
                    fiber.effect = EffectTag::Placement;
                    Some(fiber)
                }
                (None, _) => None,
            };
            let next_old = old_fiber.and_then(|(_, fiber)| fiber.sibling);
            let old_id = old_fiber.map(|(id, _)| id);

            if let Some(old_id) = old_id {
                if !same_kind {
                    if let Some(stale) = self.fibers.get_mut(old_id) {
                        stale.effect = EffectTag::Deletion;
                    }
                    self.deletions.insert(old_id);
                }
            }
            old = next_old;

            if let Some(mut fiber) = new_fiber {
                fiber.parent = Some(parent);
                let id = self.alloc_fiber(fiber);
                let link = match previous {
                    None => self.fibers.get_mut(parent),
                    Some(sibling) => self.fibers.get_mut(sibling),
                }
                .ok_or(EngineError::MissingFiber { id: parent })?;
                match previous {
                    None => link.child = Some(id),
                    Some(_) => link.sibling = Some(id),
                }
                previous = Some(id);
            }
            index += 1;
        }
        Ok(())
    }
}
