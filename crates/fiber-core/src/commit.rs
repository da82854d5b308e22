//! Applying a finished pass to the host in one synchronous step.

use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::element::{event_name, PropValue, Props, Tag, EVENT_PREFIX};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::fiber::{EffectTag, FiberId, FiberKind};
use crate::host::{Host, HostError};
use crate::NodeId;

/// One effect applied by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectRecord {
    pub fiber: FiberId,
    pub effect: EffectTag,
    pub label: String,
    pub node: Option<NodeId>,
    /// Property keys touched by an update, in application order.
    pub changed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub effects: Vec<EffectRecord>,
}

impl CommitReport {
    pub fn count(&self, effect: EffectTag) -> usize {
        self.effects.iter().filter(|e| e.effect == effect).count()
    }

    pub fn placements(&self) -> usize {
        self.count(EffectTag::Placement)
    }

    pub fn updates(&self) -> usize {
        self.count(EffectTag::Update)
    }

    pub fn deletions(&self) -> usize {
        self.count(EffectTag::Deletion)
    }

    /// Updates that actually changed something on the host.
    pub fn changed_updates(&self) -> usize {
        self.effects
            .iter()
            .filter(|e| e.effect == EffectTag::Update && !e.changed.is_empty())
            .count()
    }

    /// True when the commit left the host exactly as it was.
    pub fn is_noop(&self) -> bool {
        self.placements() == 0 && self.deletions() == 0 && self.changed_updates() == 0
    }
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} placed, {} updated ({} changed), {} deleted",
            self.placements(),
            self.updates(),
            self.changed_updates(),
            self.deletions()
        )
    }
}

fn is_event(key: &str) -> bool {
    key.starts_with(EVENT_PREFIX) && event_name(key).is_some()
}

/// Brings the host node from `prev` to `next` and returns the keys it touched.
///
/// Order: stale listeners are removed, vanished properties removed, new or
/// changed properties set, then new or changed listeners added.
pub(crate) fn apply_properties<H: Host + ?Sized>(
    host: &mut H,
    node: NodeId,
    prev: &Props,
    next: &Props,
) -> Result<Vec<String>, HostError> {
    let next_index: HashMap<&str, &PropValue> = next.attributes().collect();
    let prev_index: HashMap<&str, &PropValue> = prev.attributes().collect();
    let mut changed = Vec::new();

    for (key, value) in prev.attributes().filter(|(key, _)| is_event(key)) {
        if next_index.get(key) == Some(&value) {
            continue;
        }
        if let (Some(event), Some(listener)) = (event_name(key), value.as_listener()) {
            host.remove_listener(node, &event, listener)?;
            changed.push(key.to_owned());
        }
    }

    for (key, _) in prev.attributes().filter(|(key, _)| !is_event(key)) {
        if !next_index.contains_key(key) {
            host.remove_property(node, key)?;
            changed.push(key.to_owned());
        }
    }

    for (key, value) in next.attributes().filter(|(key, _)| !is_event(key)) {
        if prev_index.get(key) != Some(&value) {
            host.set_property(node, key, value)?;
            changed.push(key.to_owned());
        }
    }

    for (key, value) in next.attributes().filter(|(key, _)| is_event(key)) {
        if prev_index.get(key) == Some(&value) {
            continue;
        }
        let Some(listener) = value.as_listener() else {
            log::warn!("`{key}` holds {value}, not a listener; skipped");
            continue;
        };
        if let Some(event) = event_name(key) {
            host.add_listener(node, &event, listener)?;
            if !changed.iter().any(|k| k == key) {
                changed.push(key.to_owned());
            }
        }
    }

    Ok(changed)
}

impl<H: Host> Engine<H> {
    /// Applies the finished work-in-progress tree and makes it current.
    ///
    /// Deletions go first, then the new tree is walked parent before child.
    /// A placed host fiber gets its node created, its properties applied and
    /// is attached under the nearest ancestor owning a node, which the walk
    /// has already handled.
    pub(crate) fn commit_root(&mut self) -> Result<CommitReport, EngineError> {
        let Some(root) = self.wip_root else {
            return Ok(CommitReport::default());
        };
        let mut report = CommitReport::default();

        let deletions: Vec<FiberId> = self.deletions.drain().collect();
        for id in deletions {
            let parent_node = self.host_parent(id)?;
            let node = self.commit_deletion(id, parent_node)?;
            report.effects.push(self.record(id, EffectTag::Deletion, Some(node), Vec::new())?);
        }

        let mut cursor = self.fibers.get(root).and_then(|fiber| fiber.child);
        while let Some(id) = cursor {
            let fiber = self.fibers.get(id).ok_or(EngineError::MissingFiber { id })?;
            let (effect, node) = (fiber.effect, fiber.host);
            let tag = match &fiber.kind {
                FiberKind::Host(tag) => Some(tag.clone()),
                FiberKind::Root | FiberKind::Component(_) => None,
            };
            match (effect, node, tag) {
                (EffectTag::Placement, None, Some(tag)) => {
                    let node = self.create_host_node(id, &tag)?;
                    let parent_node = self.host_parent(id)?;
                    self.host.append_child(parent_node, node)?;
                    report.effects.push(self.record(id, effect, Some(node), Vec::new())?);
                }
                (EffectTag::Placement, Some(node), _) => {
                    let parent_node = self.host_parent(id)?;
                    self.host.append_child(parent_node, node)?;
                    report.effects.push(self.record(id, effect, Some(node), Vec::new())?);
                }
                (EffectTag::Update, Some(node), _) => {
                    let changed = self.update_host_node(id, node)?;
                    report.effects.push(self.record(id, effect, Some(node), changed)?);
                }
                (EffectTag::Placement | EffectTag::Update, None, _) => {
                    report.effects.push(self.record(id, effect, None, Vec::new())?);
                }
                (EffectTag::None | EffectTag::Deletion, _, _) => {}
            }
            cursor = self.fibers.next_in_subtree(id, Some(root));
        }

        self.retire_committed(root);
        log::debug!("committed {root}: {report}");
        self.last_commit = Some(report.clone());
        Ok(report)
    }

    fn create_host_node(&mut self, id: FiberId, tag: &Tag) -> Result<NodeId, EngineError> {
        let fiber = self.fibers.get_mut(id).ok_or(EngineError::MissingFiber { id })?;
        let props = Rc::clone(&fiber.props);
        let node = self.host.create_node(tag, &props)?;
        fiber.host = Some(node);
        apply_properties(&mut self.host, node, &Props::new(), &props)?;
        Ok(node)
    }

    fn update_host_node(&mut self, id: FiberId, node: NodeId) -> Result<Vec<String>, EngineError> {
        let fiber = self.fibers.get(id).ok_or(EngineError::MissingFiber { id })?;
        let next = Rc::clone(&fiber.props);
        let prev = fiber
            .alternate
            .and_then(|alternate| self.fibers.get(alternate))
            .map(|alternate| Rc::clone(&alternate.props))
            .unwrap_or_default();
        Ok(apply_properties(&mut self.host, node, &prev, &next)?)
    }

    /// Host node of the nearest ancestor that has one.
    fn host_parent(&self, id: FiberId) -> Result<NodeId, EngineError> {
        let mut cursor = self.fibers.get(id).and_then(|fiber| fiber.parent);
        while let Some(ancestor) = cursor {
            let fiber = self
                .fibers
                .get(ancestor)
                .ok_or(EngineError::MissingFiber { id: ancestor })?;
            if let Some(node) = fiber.host {
                return Ok(node);
            }
            cursor = fiber.parent;
        }
        Err(EngineError::NoHostParent { fiber: id })
    }

    // Components own no node; descend to the first host node below.
    fn commit_deletion(
        &mut self,
        id: FiberId,
        parent_node: NodeId,
    ) -> Result<NodeId, EngineError> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let fiber = self
                .fibers
                .get(current)
                .ok_or(EngineError::MissingFiber { id: current })?;
            if let Some(node) = fiber.host {
                self.host.remove_child(parent_node, node)?;
                return Ok(node);
            }
            cursor = fiber.child;
        }
        Err(EngineError::DetachedDeletion { fiber: id })
    }

    fn record(
        &self,
        id: FiberId,
        effect: EffectTag,
        node: Option<NodeId>,
        changed: Vec<String>,
    ) -> Result<EffectRecord, EngineError> {
        let fiber = self.fibers.get(id).ok_or(EngineError::MissingFiber { id })?;
        Ok(EffectRecord {
            fiber: id,
            effect,
            label: fiber.kind.label().to_owned(),
            node,
            changed,
        })
    }

    // The previous tree, deleted fibers included, is unreachable from here on.
    fn retire_committed(&mut self, root: FiberId) {
        for id in self.committed_fibers.drain(..) {
            self.fibers.free(id);
        }
        self.committed_fibers = std::mem::take(&mut self.wip_fibers);
        for id in &self.committed_fibers {
            if let Some(fiber) = self.fibers.get_mut(*id) {
                fiber.alternate = None;
                fiber.effect = EffectTag::None;
            }
        }
        self.current_root = Some(root);
        self.wip_root = None;
        self.next_unit = None;
        self.stats.commits += 1;
    }
}
