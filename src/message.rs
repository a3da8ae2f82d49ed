//! Addressed Messages
//!
//! A [`Message`] carries a binary-string payload to one port of one device.

use crate::domain::{DeviceId, Port};
use crate::error::{Error, PayloadDefect, Result};
use serde::{Deserialize, Serialize};

/// True iff `payload` is non-empty and made only of '0' and '1'
#[inline]
pub fn is_binary_string(payload: &str) -> bool {
    !payload.is_empty() && payload.bytes().all(|b| b == b'0' || b == b'1')
}

/// Check a payload and say what is wrong with it
pub fn validate_payload(payload: &str) -> Result<()> {
    if payload.trim().is_empty() {
        return Err(Error::InvalidPayload {
            reason: PayloadDefect::Empty,
        });
    }
    if !is_binary_string(payload) {
        return Err(Error::InvalidPayload {
            reason: PayloadDefect::NotBinary,
        });
    }
    Ok(())
}

/// An immutable addressed payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    recipient: DeviceId,
    port: Port,
    payload: String,
}

impl Message {
    /// Build a message without validating the payload.
    ///
    /// Meant for payloads that were already checked. Never hand untrusted
    /// input to this constructor; use [`Message::create`] instead.
    pub fn new(recipient: impl Into<DeviceId>, port: impl Into<Port>, payload: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            port: port.into(),
            payload: payload.into(),
        }
    }

    /// Build a message, rejecting empty, whitespace-only and non-binary payloads
    pub fn create(
        recipient: impl Into<DeviceId>,
        port: impl Into<Port>,
        payload: impl Into<String>,
    ) -> Result<Self> {
        let payload = payload.into();
        validate_payload(&payload)?;
        Ok(Self::new(recipient, port, payload))
    }

    pub fn recipient(&self) -> DeviceId {
        self.recipient
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Whether the payload would pass [`Message::create`]
    pub fn has_valid_payload(&self) -> bool {
        is_binary_string(&self.payload)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} <- {}", self.recipient, self.port, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_binary_strings() {
        for payload in ["0", "1", "101", "0000", "1111111", "0101010101"] {
            assert!(is_binary_string(payload), "{payload} should be binary");
        }
        for payload in ["", " ", "10 1", "102", "abc", "0|1", "１０", "1\n"] {
            assert!(!is_binary_string(payload), "{payload:?} should not be binary");
        }
    }

    #[test]
    fn test_create_rejects_empty_and_whitespace() {
        assert_matches!(
            Message::create(1, 1, ""),
            Err(Error::InvalidPayload { reason: PayloadDefect::Empty })
        );
        assert_matches!(
            Message::create(1, 1, "   \t"),
            Err(Error::InvalidPayload { reason: PayloadDefect::Empty })
        );
    }

    #[test]
    fn test_create_rejects_non_binary() {
        assert_matches!(
            Message::create(1, 1, "not binary"),
            Err(Error::InvalidPayload { reason: PayloadDefect::NotBinary })
        );
        assert_matches!(
            Message::create(1, 1, " 101 "),
            Err(Error::InvalidPayload { reason: PayloadDefect::NotBinary })
        );
    }

    #[test]
    fn test_create_accepts_binary() {
        let message = Message::create(2, 3, "100").unwrap();
        assert_eq!(message.recipient(), DeviceId(2));
        assert_eq!(message.port(), Port(3));
        assert_eq!(message.payload(), "100");
        assert!(message.has_valid_payload());
    }

    #[test]
    fn test_raw_constructor_skips_validation() {
        let message = Message::new(1, 1, "xyz");
        assert_eq!(message.payload(), "xyz");
        assert!(!message.has_valid_payload());
    }
}
