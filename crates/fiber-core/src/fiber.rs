//! Arena-allocated units of work.
//!
//! Fibers link to each other through [`FiberId`]s resolved by the
//! [`FiberArena`]; no link owns its target. Ids are generational so a link
//! into a freed tree resolves to `None` instead of aliasing a newer fiber.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::element::{Component, ElementKind, Props, Tag};
use crate::NodeId;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FiberId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FiberKind {
    /// Root of a render pass; its host node is the container given to `render`.
    Root,
    Host(Tag),
    Component(Component),
}

impl FiberKind {
    pub fn matches(&self, kind: &ElementKind) -> bool {
        match (self, kind) {
            (FiberKind::Host(a), ElementKind::Host(b)) => a == b,
            (FiberKind::Component(a), ElementKind::Component(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, FiberKind::Component(_))
    }

    pub fn label(&self) -> &str {
        match self {
            FiberKind::Root => "#root",
            FiberKind::Host(tag) => tag.as_str(),
            FiberKind::Component(component) => component.name(),
        }
    }
}

impl From<ElementKind> for FiberKind {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => FiberKind::Host(tag),
            ElementKind::Component(component) => FiberKind::Component(component),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectTag {
    #[default]
    None,
    Placement,
    Update,
    Deletion,
}

pub(crate) type StateSlot = Rc<dyn Any>;

pub struct Fiber {
    pub(crate) kind: FiberKind,
    pub(crate) props: Rc<Props>,
    pub(crate) host: Option<NodeId>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) effect: EffectTag,
    pub(crate) hooks: Vec<StateSlot>,
}

impl Fiber {
    pub(crate) fn new(kind: FiberKind, props: Rc<Props>) -> Self {
        Self {
            kind,
            props,
            host: None,
            parent: None,
            child: None,
            sibling: None,
            alternate: None,
            effect: EffectTag::None,
            hooks: Vec::new(),
        }
    }

    pub fn kind(&self) -> &FiberKind {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn host_node(&self) -> Option<NodeId> {
        self.host
    }

    pub fn parent(&self) -> Option<FiberId> {
        self.parent
    }

    pub fn child(&self) -> Option<FiberId> {
        self.child
    }

    pub fn sibling(&self) -> Option<FiberId> {
        self.sibling
    }

    pub fn alternate(&self) -> Option<FiberId> {
        self.alternate
    }

    pub fn effect(&self) -> EffectTag {
        self.effect
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("kind", &self.kind.label())
            .field("host", &self.host)
            .field("effect", &self.effect)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("sibling", &self.sibling)
            .field("alternate", &self.alternate)
            .finish()
    }
}

struct Slot {
    generation: u32,
    fiber: Option<Fiber>,
}

#[derive(Default)]
pub struct FiberArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, fiber: Fiber) -> FiberId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.fiber = Some(fiber);
            return FiberId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).expect("fiber arena exhausted");
        self.slots.push(Slot {
            generation: 0,
            fiber: Some(fiber),
        });
        FiberId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.fiber.as_ref()
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.fiber.as_mut()
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    pub fn free(&mut self, id: FiberId) -> Option<Fiber> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let fiber = slot.fiber.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(fiber)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.fiber.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next fiber in depth-first order: the child, else the sibling, else
    /// the sibling of the nearest ancestor that has one. With `root` set the
    /// walk never leaves that subtree.
    pub fn next_in_subtree(&self, id: FiberId, root: Option<FiberId>) -> Option<FiberId> {
        let fiber = self.get(id)?;
        if let Some(child) = fiber.child {
            return Some(child);
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if Some(current) == root {
                return None;
            }
            let fiber = self.get(current)?;
            if let Some(sibling) = fiber.sibling {
                return Some(sibling);
            }
            cursor = fiber.parent;
        }
        None
    }

    /// Iterates `start` and its chain of siblings.
    pub fn siblings(&self, start: Option<FiberId>) -> impl Iterator<Item = FiberId> + '_ {
        std::iter::successors(start, move |id| self.get(*id).and_then(|f| f.sibling))
    }
}
