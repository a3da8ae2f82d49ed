//! Fabric Events
//!
//! Events emitted by a motherboard for external consumers to react to
//! membership changes and routing outcomes.

use crate::domain::{DeviceId, Port};
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};

/// Events emitted by a motherboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FabricEvent {
    /// A device joined the device table
    DeviceAttached { device: DeviceId },

    /// A device was removed from the device table
    DeviceDetached { device: DeviceId },

    /// An attached device was re-keyed
    DeviceRenamed { from: DeviceId, to: DeviceId },

    /// A unicast message reached an application
    UnicastDelivered { recipient: DeviceId, port: Port },

    /// A unicast message could not be delivered
    UnicastDropped {
        recipient: DeviceId,
        port: Port,
        reason: ErrorKind,
    },

    /// A broadcast payload was handed to every opted-in device
    BroadcastFannedOut { devices: usize, applications: usize },
}

impl FabricEvent {
    /// The device this event is about, if it concerns a single one
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            FabricEvent::DeviceAttached { device } => Some(*device),
            FabricEvent::DeviceDetached { device } => Some(*device),
            FabricEvent::DeviceRenamed { to, .. } => Some(*to),
            FabricEvent::UnicastDelivered { recipient, .. } => Some(*recipient),
            FabricEvent::UnicastDropped { recipient, .. } => Some(*recipient),
            FabricEvent::BroadcastFannedOut { .. } => None,
        }
    }

    /// Check if this event changed the device table
    pub fn is_membership_event(&self) -> bool {
        matches!(
            self,
            FabricEvent::DeviceAttached { .. }
                | FabricEvent::DeviceDetached { .. }
                | FabricEvent::DeviceRenamed { .. }
        )
    }

    /// Check if this event reports traffic
    pub fn is_traffic_event(&self) -> bool {
        !self.is_membership_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_device() {
        let event = FabricEvent::DeviceRenamed {
            from: DeviceId(3),
            to: DeviceId(7),
        };
        assert_eq!(event.device(), Some(DeviceId(7)));
        assert!(event.is_membership_event());

        let event = FabricEvent::BroadcastFannedOut {
            devices: 2,
            applications: 5,
        };
        assert_eq!(event.device(), None);
        assert!(event.is_traffic_event());
    }

    #[test]
    fn test_event_json_shape() {
        let event = FabricEvent::UnicastDropped {
            recipient: DeviceId(99),
            port: Port(1),
            reason: ErrorKind::NoSuchRecipient,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "unicast_dropped");
        assert_eq!(json["recipient"], 99);
        assert_eq!(json["reason"], "no_such_recipient");
    }
}
