//! Incremental, interruptible reconciliation of element trees onto a host tree.
//!
//! A render pass is split into units of work, one per fiber, that the
//! [`Engine::work_loop`] performs inside host-granted idle slices. Nothing
//! reaches the [`Host`] until a pass has visited every fiber; the commit
//! then applies all effects in one synchronous step.

mod element;

pub mod collections;
mod commit;
mod engine;
mod error;
mod fiber;
pub mod hash;
mod hooks;
mod host;
mod options;
pub mod platform;
mod reconcile;
mod runtime;
mod scheduler;

pub use commit::{CommitReport, EffectRecord};
pub use element::{
    component, event_name, host, make_element, text_element, Child, Component, Element,
    ElementKind, Listener, PropValue, Props, Tag, CHILDREN, EVENT_PREFIX, NODE_VALUE, TEXT_TAG,
};
pub use engine::{Engine, EngineStats};
pub use error::EngineError;
pub use fiber::{EffectTag, Fiber, FiberArena, FiberId, FiberKind};
pub use hooks::{in_component_render, useState, use_state, use_state_with, Dispatch};
pub use host::{Host, HostError, HostNode, MemoryHost};
pub use options::EngineOptions;
pub use platform::{Deadline, FixedDeadline, IdleScheduler};
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};
pub use scheduler::SliceOutcome;

pub type Key = u64;
pub type NodeId = usize;
