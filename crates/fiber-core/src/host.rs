//! The boundary between the engine and the tree it mutates.

use std::fmt;

use crate::collections::map::HashMap;
use crate::element::{Listener, PropValue, Props, Tag, NODE_VALUE};
use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: NodeId },
    NotAChild { parent: NodeId, child: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::NotAChild { parent, child } => {
                write!(f, "host node {child} is not a child of {parent}")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Mutation primitives of an external tree.
///
/// Nodes are created detached; they only become part of the visible tree
/// through [`Host::append_child`], which the committer calls.
pub trait Host {
    fn create_node(&mut self, tag: &Tag, props: &Props) -> Result<NodeId, HostError>;
    fn set_property(&mut self, node: NodeId, name: &str, value: &PropValue)
        -> Result<(), HostError>;
    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), HostError>;
    fn add_listener(
        &mut self,
        node: NodeId,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError>;
    fn remove_listener(
        &mut self,
        node: NodeId,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError>;
}

#[derive(Debug, Default)]
pub struct HostNode {
    tag: Option<Tag>,
    properties: Vec<(String, PropValue)>,
    listeners: HashMap<String, Vec<Listener>>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl HostNode {
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    pub fn property(&self, name: &str) -> Option<&PropValue> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }
}

/// In-memory [`Host`] used by tests, the std runtime and the demo.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<HostNode>>,
    free: Vec<NodeId>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Creates a container node that is never owned by a fiber.
    pub fn create_container(&mut self) -> NodeId {
        self.insert(HostNode::default())
    }

    pub fn node(&self, id: NodeId) -> Result<&HostNode, HostError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<PropValue> {
        self.node(id).ok()?.property(name).cloned()
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: NodeId, output: &mut String) {
        let Ok(node) = self.node(id) else {
            return;
        };
        if node.tag.as_ref().is_some_and(Tag::is_text) {
            if let Some(PropValue::Text(text)) = node.property(NODE_VALUE) {
                output.push_str(text);
            }
        }
        for child in &node.children {
            self.collect_text(*child, output);
        }
    }

    /// Invokes every listener registered for `event` on `id`.
    ///
    /// Returns how many listeners ran.
    pub fn dispatch_event(&self, id: NodeId, event: &str) -> Result<usize, HostError> {
        let listeners: Vec<Listener> = self
            .node(id)?
            .listeners
            .get(event)
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            listener.call();
        }
        Ok(listeners.len())
    }

    /// First node under `root` (inclusive, depth-first) with the given tag.
    pub fn find_by_tag(&self, root: NodeId, tag: &str) -> Option<NodeId> {
        let node = self.node(root).ok()?;
        if node.tag.as_ref().is_some_and(|t| t.as_str() == tag) {
            return Some(root);
        }
        node.children
            .iter()
            .find_map(|child| self.find_by_tag(*child, tag))
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        if let Some(Some(node)) = self.nodes.get(id) {
            let label = node.tag.as_ref().map_or("#container", Tag::as_str);
            output.push_str(&format!("{indent}[{id}] {label}"));
            for (key, value) in &node.properties {
                output.push_str(&format!(" {key}={value}"));
            }
            let mut events: Vec<&String> = node
                .listeners
                .iter()
                .filter(|(_, listeners)| !listeners.is_empty())
                .map(|(event, _)| event)
                .collect();
            events.sort();
            for event in events {
                output.push_str(&format!(" @{event}"));
            }
            output.push('\n');
            for child_id in &node.children {
                self.dump_node(output, *child_id, depth + 1);
            }
        } else {
            output.push_str(&format!("{indent}[{id}] (missing)\n"));
        }
    }
}

impl Host for MemoryHost {
    fn create_node(&mut self, tag: &Tag, _props: &Props) -> Result<NodeId, HostError> {
        Ok(self.insert(HostNode {
            tag: Some(tag.clone()),
            ..HostNode::default()
        }))
    }

    fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        let node = self.node_mut(node)?;
        match node.properties.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value.clone(),
            None => node.properties.push((name.to_owned(), value.clone())),
        }
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), HostError> {
        let node = self.node_mut(node)?;
        node.properties.retain(|(key, _)| key != name);
        Ok(())
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError> {
        let node = self.node_mut(node)?;
        node.listeners
            .entry(event.to_owned())
            .or_default()
            .push(listener.clone());
        Ok(())
    }

    fn remove_listener(
        &mut self,
        node: NodeId,
        event: &str,
        listener: &Listener,
    ) -> Result<(), HostError> {
        let node = self.node_mut(node)?;
        if let Some(listeners) = node.listeners.get_mut(event) {
            listeners.retain(|existing| existing != listener);
        }
        Ok(())
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.node(parent)?;
        let previous = self.node_mut(child)?.parent.replace(parent);
        if let Some(previous) = previous {
            if let Ok(old_parent) = self.node_mut(previous) {
                old_parent.children.retain(|c| *c != child);
            }
        }
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        let parent_node = self.node_mut(parent)?;
        let position = parent_node
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(HostError::NotAChild { parent, child })?;
        parent_node.children.remove(position);
        self.release(child);
        Ok(())
    }
}

impl MemoryHost {
    fn insert(&mut self, node: HostNode) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    // Removed subtrees are never reattached; their slots are reused.
    fn release(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        self.free.push(id);
        for child in children {
            self.release(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn remove_child_releases_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let div = host.create_node(&Tag::from("div"), &Props::new()).unwrap();
        let span = host.create_node(&Tag::from("span"), &Props::new()).unwrap();
        host.append_child(root, div).unwrap();
        host.append_child(div, span).unwrap();
        assert_eq!(host.len(), 3);

        host.remove_child(root, div).unwrap();
        assert_eq!(host.len(), 1);
        assert!(host.node(span).is_err());

        let reused = host.create_node(&Tag::from("p"), &Props::new()).unwrap();
        assert_eq!(reused, span);
        assert_eq!(host.len(), 2);
        assert!(host.node(reused).unwrap().children().is_empty());
        assert_eq!(
            host.remove_child(root, div),
            Err(HostError::NotAChild {
                parent: root,
                child: div
            })
        );
    }

    #[test]
    fn dispatch_event_runs_registered_listeners() {
        let mut host = MemoryHost::new();
        let button = host.create_node(&Tag::from("button"), &Props::new()).unwrap();
        let clicks = Rc::new(Cell::new(0));
        let listener = {
            let clicks = clicks.clone();
            Listener::new(move || clicks.set(clicks.get() + 1))
        };
        host.add_listener(button, "click", &listener).unwrap();
        assert_eq!(host.dispatch_event(button, "click").unwrap(), 1);
        host.remove_listener(button, "click", &listener).unwrap();
        assert_eq!(host.dispatch_event(button, "click").unwrap(), 0);
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn dump_tree_lists_properties_and_events() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let h1 = host.create_node(&Tag::from("h1"), &Props::new()).unwrap();
        host.set_property(h1, "id", &PropValue::from("title")).unwrap();
        host.add_listener(h1, "click", &Listener::new(|| {})).unwrap();
        host.append_child(root, h1).unwrap();
        assert_eq!(
            host.dump_tree(Some(root)),
            "[0] #container\n  [1] h1 id=\"title\" @click\n"
        );
    }
}
