//! Applications
//!
//! An [`Application`] is the unit that produces and consumes payloads. It is
//! tied to one device for its whole life and listens on at most one of that
//! device's ports. The port it holds lives in the device's port table, so the
//! two can never disagree.
//!
//! Binding is strict: a bound application must [`unbind`](Application::unbind)
//! before it can bind to another port.

use crate::diagnostics::raise;
use crate::domain::{ApplicationId, Port, Receiver};
use crate::endpoint::device::Device;
use crate::error::{Error, Result};
use crate::message::{validate_payload, Message};
use std::sync::Arc;

/// A named endpoint on a device
pub struct Application {
    id: ApplicationId,
    name: String,
    device: Arc<Device>,
    receiver: Arc<dyn Receiver>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("device", &self.device.identifier())
            .finish()
    }
}

impl Application {
    /// Create an unbound application on `device` whose hooks are `receiver`
    pub fn new(name: impl Into<String>, device: &Arc<Device>, receiver: Arc<dyn Receiver>) -> Self {
        Self {
            id: ApplicationId::next(),
            name: name.into(),
            device: Arc::clone(device),
            receiver,
        }
    }

    pub fn id(&self) -> ApplicationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub(crate) fn receiver(&self) -> Arc<dyn Receiver> {
        Arc::clone(&self.receiver)
    }

    // =========================================================================
    // Port Binding
    // =========================================================================

    /// Listen on `port` of this application's device
    pub fn bind_port(&self, port: impl Into<Port>) -> Result<()> {
        self.device.register_application(port, self)
    }

    /// Stop listening, returning the port that was freed
    pub fn unbind(&self) -> Result<Port> {
        self.device
            .release_application(self.id)
            .ok_or_else(|| self.unbound_error())
    }

    pub fn is_bound(&self) -> bool {
        self.device.is_application_bound(self.id)
    }

    pub fn bound_port(&self) -> Option<Port> {
        self.device.port_of(self.id)
    }

    fn unbound_error(&self) -> Error {
        Error::Unbound {
            application: self.id,
            device: self.device.identifier(),
        }
    }

    /// An unbound sender can still send, but replies have nowhere to land
    fn warn_if_unbound(&self) {
        if !self.is_bound() {
            raise(self.device.sink(), &self.unbound_error());
        }
    }

    // =========================================================================
    // Traffic
    // =========================================================================

    /// Send `message` through this application's device
    pub fn send(&self, message: &Message) -> Result<()> {
        self.warn_if_unbound();
        self.device.send(message)
    }

    /// Broadcast `payload` through this application's device.
    /// Returns how many devices were offered the payload.
    pub fn broadcast(&self, payload: &str) -> Result<usize> {
        if let Err(e) = validate_payload(payload) {
            raise(self.device.sink(), &e);
            return Err(e);
        }
        self.warn_if_unbound();
        self.device.broadcast(payload)
    }
}
