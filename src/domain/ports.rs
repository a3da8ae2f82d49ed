//! Domain Ports - Core trait definitions for the device fabric
//!
//! These traits define the boundaries between the routing core and the code
//! embedding it. Endpoints implement [`Receiver`] to consume traffic; hosts
//! implement [`DiagnosticSink`] to observe non-fatal failures.

use crate::domain::DeviceId;
use crate::error::{Error, ErrorKind};
use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Receive Hooks
// =============================================================================

/// Capability interface for an application's receive hooks
///
/// The fabric guarantees delivery up to these calls; what happens inside them
/// is the implementor's business. Hooks are invoked without any fabric lock
/// held, so they may send from within.
pub trait Receiver: Send + Sync {
    /// A unicast message addressed to the port this receiver is bound to
    fn on_message(&self, message: &Message);

    /// A broadcast payload that reached this receiver's device
    fn on_broadcast(&self, payload: &str);
}

// =============================================================================
// Diagnostics
// =============================================================================

/// A descriptive record of a non-fatal failure
///
/// The message text is for humans; nothing in the fabric parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Failure classification
    pub kind: ErrorKind,
    /// Human readable description
    pub message: String,
    /// Device the failure concerns, when known
    pub device: Option<DeviceId>,
    /// When the failure was reported
    pub reported_at: DateTime<Utc>,
}

impl Diagnostic {
    /// Build a diagnostic from an error
    pub fn from_error(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            device: error.device(),
            reported_at: Utc::now(),
        }
    }
}

impl From<&Error> for Diagnostic {
    fn from(error: &Error) -> Self {
        Self::from_error(error)
    }
}

/// Destination for diagnostics raised on expected failure paths
pub trait DiagnosticSink: Send + Sync {
    /// Accept one diagnostic
    fn report(&self, diagnostic: Diagnostic);
}
