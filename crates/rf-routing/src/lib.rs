//! rf-routing: Route signal graph scheduler
//!
//! Owns the mixer's feed graph and everything derived from it:
//!
//! - **Feed edges**: which route reaches which, and whether only via sends
//! - **Processing order**: Kahn sort with stable tie-break, feedback tolerant
//! - **Reachability**: transitive "who feeds me" closure used by solo logic
//! - **Solo/mute propagation**: implicit upstream/downstream solo counters
//! - **Latency compensation**: bounded fixed-point latency passes and
//!   mix-point alignment delays
//!
//! The audio thread reads a [`GraphSnapshot`] published through an
//! `ArcSwap`; all mutation happens on the control thread via [`RouteGraph`].

pub mod config;
pub mod edges;
pub mod error;
pub mod events;
pub mod graph;
pub mod groups;
pub mod io;
pub mod latency;
pub mod pdc;
pub mod processor;
pub mod reach;
pub mod route;
pub mod snapshot;
pub mod solo;
pub mod sort;

pub use config::RoutingConfig;
pub use edges::{FeedEdge, FeedEdges};
pub use error::{RoutingError, RoutingResult};
pub use events::{EventSender, GraphEvent};
pub use graph::{ConnectionBatch, ResortOutcome, RouteGraph};
pub use groups::{GroupControlDisposition, RouteGroup};
pub use io::{Io, Port, PortDirection, PortRef};
pub use latency::{LatencyCompensation, LatencyDirection, LatencyReport, LatencyUpdate};
pub use pdc::{FeedPath, PdcDelayLine};
pub use processor::{AuxSend, Insert, Processor};
pub use reach::{ReachSet, Reachability};
pub use route::{Route, RouteKind, RouteSpec};
pub use snapshot::GraphSnapshot;
pub use solo::{MuteControl, SoloControl, SoloIsolateControl};
pub use sort::FeedbackDetected;

pub use rf_core::{DataType, GroupId, LatencySamples, RouteId};
