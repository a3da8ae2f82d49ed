//! Identifiers used for addressing

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Device ID
// =============================================================================

/// Identifier a motherboard routes on; unique per motherboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// =============================================================================
// Port
// =============================================================================

/// Port number on a device; at most one application listens on each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Port(pub u16);

impl std::fmt::Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Port {
    fn from(port: u16) -> Self {
        Self(port)
    }
}

// =============================================================================
// Application ID
// =============================================================================

static NEXT_APPLICATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an application, used as the reverse key of a
/// device's port table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

impl ApplicationId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        Self(NEXT_APPLICATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_ids_are_unique() {
        let a = ApplicationId::next();
        let b = ApplicationId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_display() {
        assert_eq!(DeviceId(7).to_string(), "7");
        assert_eq!(Port(80).to_string(), "80");
        assert_eq!(ApplicationId(3).to_string(), "app-3");
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&DeviceId(42)).unwrap();
        assert_eq!(json, "42");
        let port: Port = serde_json::from_str("8").unwrap();
        assert_eq!(port, Port(8));
    }
}
