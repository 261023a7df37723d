// Error types for the PIO routing core

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::{InterfaceId, NodeId};

/// Recoverable failures reported by the routing core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no route to host {0}")]
    NoRouteToHost(Ipv4Addr),

    #[error("multicast destination {0} needs an output interface")]
    MulticastWithoutInterface(Ipv4Addr),

    #[error("routing protocol is already attached to node {0}")]
    AlreadyAttached(NodeId),

    #[error("routing protocol cannot be attached to a missing stack")]
    MissingStack,

    #[error("routing protocol is not attached to a stack")]
    NotAttached,

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown interface {0}")]
    UnknownInterface(InterfaceId),

    #[error("no PIO routing protocol installed on node {0}")]
    ProtocolNotInstalled(NodeId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using RoutingError
pub type RoutingResult<T> = Result<T, RoutingError>;

impl RoutingError {
    /// Lookup failures are a normal outcome of forwarding, everything else is misuse.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            RoutingError::NoRouteToHost(_) | RoutingError::MulticastWithoutInterface(_)
        )
    }
}
