//! Route and group identifiers, port data types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique route identifier
///
/// Ordering follows creation order, which the route graph uses to place
/// routes it has never sorted before.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RouteId(pub u64);

impl RouteId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get as u64
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// Unique route group identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GroupId(pub u64);

impl GroupId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// What a port carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Audio,
    Midi,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Midi => f.write_str("midi"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_id_order_follows_value() {
        let mut ids = vec![RouteId(7), RouteId(2), RouteId(5)];
        ids.sort();
        assert_eq!(ids, vec![RouteId(2), RouteId(5), RouteId(7)]);
        assert_eq!(RouteId::new(3).to_string(), "route#3");
    }

    #[test]
    fn test_route_id_serde() {
        let json = serde_json::to_string(&RouteId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
