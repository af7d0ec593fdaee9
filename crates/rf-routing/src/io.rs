//! Route ports and connections
//!
//! A connection is a symmetric link between an output port of one route
//! and an input port of another; both ends record the peer. Each port
//! also carries the latency ranges the latency engine computes for it.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use rf_core::{DataType, LatencyRange, RouteId};

use crate::latency::LatencyDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Address of a port: owning route, side, index within that side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub route: RouteId,
    pub direction: PortDirection,
    pub index: usize,
}

impl PortRef {
    pub fn input(route: RouteId, index: usize) -> Self {
        Self {
            route,
            direction: PortDirection::Input,
            index,
        }
    }

    pub fn output(route: RouteId, index: usize) -> Self {
        Self {
            route,
            direction: PortDirection::Output,
            index,
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        write!(f, "{}/{} {}", self.route, side, self.index)
    }
}

#[derive(Debug, Clone)]
pub struct Port {
    data_type: DataType,
    connections: SmallVec<[PortRef; 4]>,
    private_playback: LatencyRange,
    private_capture: LatencyRange,
    public_playback: LatencyRange,
    public_capture: LatencyRange,
}

impl Port {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            connections: SmallVec::new(),
            private_playback: LatencyRange::ZERO,
            private_capture: LatencyRange::ZERO,
            public_playback: LatencyRange::ZERO,
            public_capture: LatencyRange::ZERO,
        }
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn connections(&self) -> &[PortRef] {
        &self.connections
    }

    #[inline]
    pub fn connected(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn connected_to(&self, peer: PortRef) -> bool {
        self.connections.contains(&peer)
    }

    /// Returns false if already connected
    fn connect(&mut self, peer: PortRef) -> bool {
        if self.connected_to(peer) {
            return false;
        }
        self.connections.push(peer);
        true
    }

    fn disconnect(&mut self, peer: PortRef) -> bool {
        let before = self.connections.len();
        self.connections.retain(|p| *p != peer);
        before != self.connections.len()
    }

    pub fn private_latency(&self, direction: LatencyDirection) -> LatencyRange {
        match direction {
            LatencyDirection::Playback => self.private_playback,
            LatencyDirection::Capture => self.private_capture,
        }
    }

    pub fn set_private_latency(&mut self, range: LatencyRange, direction: LatencyDirection) {
        match direction {
            LatencyDirection::Playback => self.private_playback = range,
            LatencyDirection::Capture => self.private_capture = range,
        }
    }

    pub fn public_latency(&self, direction: LatencyDirection) -> LatencyRange {
        match direction {
            LatencyDirection::Playback => self.public_playback,
            LatencyDirection::Capture => self.public_capture,
        }
    }

    pub fn set_public_latency(&mut self, range: LatencyRange, direction: LatencyDirection) {
        match direction {
            LatencyDirection::Playback => self.public_playback = range,
            LatencyDirection::Capture => self.public_capture = range,
        }
    }
}

/// One side (inputs or outputs) of a route
#[derive(Debug, Clone)]
pub struct Io {
    direction: PortDirection,
    ports: Vec<Port>,
}

impl Io {
    pub fn new(direction: PortDirection) -> Self {
        Self {
            direction,
            ports: Vec::new(),
        }
    }

    #[inline]
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Append a port, returning its index
    pub fn add_port(&mut self, data_type: DataType) -> usize {
        self.ports.push(Port::new(data_type));
        self.ports.len() - 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut [Port] {
        &mut self.ports
    }

    pub fn port(&self, index: usize) -> Option<&Port> {
        self.ports.get(index)
    }

    /// Indices of ports carrying `data_type`, in order
    pub fn indices_of(&self, data_type: DataType) -> Vec<usize> {
        self.ports
            .iter()
            .enumerate()
            .filter(|(_, p)| p.data_type == data_type)
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether any port here is connected to a port owned by `route`
    pub fn connected_to_route(&self, route: RouteId) -> bool {
        self.ports
            .iter()
            .any(|p| p.connections.iter().any(|c| c.route == route))
    }

    pub(crate) fn connect(&mut self, index: usize, peer: PortRef) -> bool {
        self.ports
            .get_mut(index)
            .is_some_and(|port| port.connect(peer))
    }

    pub(crate) fn disconnect(&mut self, index: usize, peer: PortRef) -> bool {
        self.ports
            .get_mut(index)
            .is_some_and(|port| port.disconnect(peer))
    }

    /// Drop every connection to ports of `route`; returns how many went
    pub(crate) fn disconnect_route(&mut self, route: RouteId) -> usize {
        let mut removed = 0;
        for port in &mut self.ports {
            let before = port.connections.len();
            port.connections.retain(|c| c.route != route);
            removed += before - port.connections.len();
        }
        removed
    }

    /// Publish the same range on every port
    pub fn set_public_latency(&mut self, range: LatencyRange, direction: LatencyDirection) {
        for port in &mut self.ports {
            port.set_public_latency(range, direction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_idempotent() {
        let mut io = Io::new(PortDirection::Output);
        let idx = io.add_port(DataType::Audio);
        let peer = PortRef::input(RouteId(2), 0);
        assert!(io.connect(idx, peer));
        assert!(!io.connect(idx, peer));
        assert_eq!(io.port(idx).map(|p| p.connections().len()), Some(1));
        assert!(io.connected_to_route(RouteId(2)));
    }

    #[test]
    fn test_disconnect_route_removes_all_links() {
        let mut io = Io::new(PortDirection::Output);
        io.add_port(DataType::Audio);
        io.add_port(DataType::Audio);
        io.connect(0, PortRef::input(RouteId(2), 0));
        io.connect(1, PortRef::input(RouteId(2), 1));
        io.connect(1, PortRef::input(RouteId(3), 0));
        assert_eq!(io.disconnect_route(RouteId(2)), 2);
        assert!(!io.connected_to_route(RouteId(2)));
        assert!(io.connected_to_route(RouteId(3)));
    }

    #[test]
    fn test_indices_by_data_type() {
        let mut io = Io::new(PortDirection::Input);
        io.add_port(DataType::Audio);
        io.add_port(DataType::Midi);
        io.add_port(DataType::Audio);
        assert_eq!(io.indices_of(DataType::Audio), vec![0, 2]);
        assert_eq!(io.indices_of(DataType::Midi), vec![1]);
    }

    #[test]
    fn test_port_ref_display() {
        assert_eq!(PortRef::output(RouteId(4), 1).to_string(), "route#4/out 1");
    }
}
