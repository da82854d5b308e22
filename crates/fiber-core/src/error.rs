use std::fmt;

use crate::fiber::FiberId;
use crate::host::HostError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Host(HostError),
    MissingFiber { id: FiberId },
    /// A deleted subtree resolved to no host node at all.
    DetachedDeletion { fiber: FiberId },
    /// No ancestor of a fiber owns a host node.
    NoHostParent { fiber: FiberId },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Host(err) => write!(f, "host error: {err}"),
            EngineError::MissingFiber { id } => write!(f, "fiber {id} missing"),
            EngineError::DetachedDeletion { fiber } => {
                write!(f, "deleted fiber {fiber} has no host node in its subtree")
            }
            EngineError::NoHostParent { fiber } => {
                write!(f, "fiber {fiber} has no ancestor with a host node")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HostError> for EngineError {
    fn from(err: HostError) -> Self {
        EngineError::Host(err)
    }
}
