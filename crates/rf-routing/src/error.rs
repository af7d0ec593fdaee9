//! Control-side routing errors
//!
//! Only setup operations (adding routes, wiring ports, sends, groups)
//! fail with these. Graph recomputation reports feedback and latency
//! bailout as values, never as errors.

use rf_core::{DataType, GroupId, RfError, RouteId};
use thiserror::Error;

use crate::io::PortRef;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("route {0} not found")]
    RouteNotFound(RouteId),

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("port {0} not found")]
    PortNotFound(PortRef),

    #[error("send {index} not found on {route}")]
    SendNotFound { route: RouteId, index: usize },

    #[error("no processor at slot {index} on {route}")]
    ProcessorNotFound { route: RouteId, index: usize },

    #[error("{0} cannot feed itself")]
    SelfConnection(RouteId),

    #[error("cannot connect {from} port to {to} port")]
    DataTypeMismatch { from: DataType, to: DataType },

    #[error("{from} -> {to}: connections run from an output to an input")]
    WrongDirection { from: PortRef, to: PortRef },

    #[error("invalid configuration: {0}")]
    Config(#[from] RfError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;
