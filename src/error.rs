//! Error types for the device fabric
//!
//! Every routing failure is recoverable by the caller and surfaces as an
//! [`Error`] value. [`Error::kind`] folds the variants into the coarse
//! taxonomy used for diagnostics.

use crate::domain::{ApplicationId, DeviceId, Port};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a payload was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadDefect {
    /// Empty or whitespace-only
    Empty,
    /// Contains a character other than '0' or '1'
    NotBinary,
}

impl std::fmt::Display for PayloadDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadDefect::Empty => write!(f, "payload cannot be empty or only whitespace"),
            PayloadDefect::NotBinary => write!(f, "payload must be a binary string"),
        }
    }
}

/// Unified error type for the fabric
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Payload Errors
    // =========================================================================
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: PayloadDefect },

    // =========================================================================
    // Port Binding Errors
    // =========================================================================
    #[error("port {port} on device {device} is already taken by application {holder}")]
    PortTaken {
        device: DeviceId,
        port: Port,
        holder: ApplicationId,
    },

    #[error("application {application} is already bound to port {bound} so it was not bound to port {requested}")]
    AlreadyBound {
        application: ApplicationId,
        bound: Port,
        requested: Port,
    },

    #[error("application {application} lives on device {owner} and cannot be registered on device {device}")]
    ForeignApplication {
        application: ApplicationId,
        owner: DeviceId,
        device: DeviceId,
    },

    #[error("application {application} is not bound to a port on device {device} so messages cannot be received")]
    Unbound {
        application: ApplicationId,
        device: DeviceId,
    },

    // =========================================================================
    // Attachment Errors
    // =========================================================================
    #[error("a device with ID {device} is already attached to motherboard {motherboard}")]
    DeviceIdConflict { device: DeviceId, motherboard: String },

    #[error("device {device} is already attached to motherboard {motherboard}")]
    AlreadyAttached { device: DeviceId, motherboard: String },

    #[error("device {device} is not attached to a motherboard")]
    NotAttached { device: DeviceId },

    // =========================================================================
    // Routing Errors
    // =========================================================================
    #[error("no device with ID {device} is attached to motherboard {motherboard}")]
    NoSuchRecipient { device: DeviceId, motherboard: String },

    #[error("no application is listening on port {port} of device {device}")]
    NoListener { device: DeviceId, port: Port },

    // =========================================================================
    // Scenario / Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPayload,
    PortConflict,
    DeviceIdConflict,
    NotAttached,
    NoSuchRecipient,
    NoListener,
    /// Sender has no port; reported but never returned from a send
    Unbound,
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidPayload => write!(f, "invalid_payload"),
            ErrorKind::PortConflict => write!(f, "port_conflict"),
            ErrorKind::DeviceIdConflict => write!(f, "device_id_conflict"),
            ErrorKind::NotAttached => write!(f, "not_attached"),
            ErrorKind::NoSuchRecipient => write!(f, "no_such_recipient"),
            ErrorKind::NoListener => write!(f, "no_listener"),
            ErrorKind::Unbound => write!(f, "unbound"),
            ErrorKind::Configuration => write!(f, "configuration"),
        }
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            Error::PortTaken { .. }
            | Error::AlreadyBound { .. }
            | Error::ForeignApplication { .. } => ErrorKind::PortConflict,
            Error::Unbound { .. } => ErrorKind::Unbound,
            Error::DeviceIdConflict { .. } | Error::AlreadyAttached { .. } => {
                ErrorKind::DeviceIdConflict
            }
            Error::NotAttached { .. } => ErrorKind::NotAttached,
            Error::NoSuchRecipient { .. } => ErrorKind::NoSuchRecipient,
            Error::NoListener { .. } => ErrorKind::NoListener,
            Error::Configuration(_) | Error::JsonParse(_) | Error::Io(_) => {
                ErrorKind::Configuration
            }
        }
    }

    /// Check if this error is a routing condition rather than a setup mistake
    pub fn is_routing_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotAttached | ErrorKind::NoSuchRecipient | ErrorKind::NoListener
        )
    }

    /// The device this error concerns, if any
    pub fn device(&self) -> Option<DeviceId> {
        match self {
            Error::PortTaken { device, .. }
            | Error::ForeignApplication { device, .. }
            | Error::Unbound { device, .. }
            | Error::DeviceIdConflict { device, .. }
            | Error::AlreadyAttached { device, .. }
            | Error::NotAttached { device }
            | Error::NoSuchRecipient { device, .. }
            | Error::NoListener { device, .. } => Some(*device),
            _ => None,
        }
    }
}

/// Result type alias for the fabric
pub type Result<T> = std::result::Result<T, Error>;
