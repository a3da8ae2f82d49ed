//! Devices
//!
//! A [`Device`] multiplexes applications over numbered ports. Outbound traffic
//! goes up to the motherboard the device is attached to; inbound traffic is
//! demultiplexed to the application bound on the addressed port.
//!
//! Two locks guard a device: one over its port table, one over its identity
//! (identifier plus motherboard link). The motherboard takes its table lock
//! before a device's identity lock, never the other way round, and no lock is
//! held while a receive hook runs.

use crate::diagnostics::{raise, DiscardSink};
use crate::domain::{ApplicationId, DeviceId, DiagnosticSink, Port};
use crate::endpoint::application::Application;
use crate::endpoint::port_table::PortTable;
use crate::error::{Error, Result};
use crate::message::{validate_payload, Message};
use crate::motherboard::{Motherboard, Rekey};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

// =============================================================================
// Identity
// =============================================================================

/// Identifier and motherboard link, always mutated together
pub(crate) struct Identity {
    pub(crate) identifier: DeviceId,
    link: Option<Weak<Motherboard>>,
}

impl Identity {
    /// The attached motherboard; a link to a dropped motherboard is cleared
    pub(crate) fn motherboard(&mut self) -> Option<Arc<Motherboard>> {
        let upgraded = self.link.as_ref().and_then(Weak::upgrade);
        if upgraded.is_none() {
            self.link = None;
        }
        upgraded
    }

    pub(crate) fn is_linked_to(&self, motherboard: &Motherboard) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| std::ptr::eq(link.as_ptr(), motherboard))
    }

    pub(crate) fn link(&mut self, motherboard: &Arc<Motherboard>) {
        self.link = Some(Arc::downgrade(motherboard));
    }

    pub(crate) fn unlink(&mut self) {
        self.link = None;
    }
}

// =============================================================================
// Device
// =============================================================================

/// A routable node addressed by its identifier
pub struct Device {
    identity: Mutex<Identity>,
    ports: Mutex<PortTable>,
    receive_broadcast: AtomicBool,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("identifier", &self.identifier())
            .field("listeners", &self.ports.lock().len())
            .field("receive_broadcast", &self.wants_broadcast())
            .finish()
    }
}

impl Device {
    /// Create an unattached device
    pub fn new(identifier: impl Into<DeviceId>, receive_broadcast: bool) -> Arc<Self> {
        Self::with_sink(identifier, receive_broadcast, DiscardSink::shared())
    }

    /// Create an unattached device reporting diagnostics to `sink`
    pub fn with_sink(
        identifier: impl Into<DeviceId>,
        receive_broadcast: bool,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity: Mutex::new(Identity {
                identifier: identifier.into(),
                link: None,
            }),
            ports: Mutex::new(PortTable::default()),
            receive_broadcast: AtomicBool::new(receive_broadcast),
            sink,
        })
    }

    pub(crate) fn identity(&self) -> MutexGuard<'_, Identity> {
        self.identity.lock()
    }

    pub(crate) fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    pub fn identifier(&self) -> DeviceId {
        self.identity.lock().identifier
    }

    // =========================================================================
    // Identity & Attachment
    // =========================================================================

    /// Change this device's identifier.
    ///
    /// Unattached devices change freely. An attached device is re-keyed on its
    /// motherboard in one critical section, and the change is refused with
    /// [`Error::DeviceIdConflict`] when the motherboard already has a device
    /// under `identifier` (including this one).
    pub fn set_identifier(&self, identifier: impl Into<DeviceId>) -> Result<()> {
        let identifier = identifier.into();
        loop {
            let motherboard = {
                let mut identity = self.identity.lock();
                match identity.motherboard() {
                    Some(motherboard) => motherboard,
                    None => {
                        let previous = std::mem::replace(&mut identity.identifier, identifier);
                        debug!(from = %previous, to = %identifier, "Unattached device renamed");
                        return Ok(());
                    }
                }
            };
            // Detached between the two locks: retry as an unattached rename
            match motherboard.rekey_device(self, identifier)? {
                Rekey::Done => return Ok(()),
                Rekey::Unlinked => continue,
            }
        }
    }

    /// Attach to `motherboard`. One-way: only the motherboard can detach.
    ///
    /// Fails with [`Error::DeviceIdConflict`] when the motherboard already holds
    /// this identifier, and with [`Error::AlreadyAttached`] when the device is
    /// still linked to another live motherboard.
    pub fn attach(self: &Arc<Self>, motherboard: &Arc<Motherboard>) -> Result<()> {
        motherboard.attach_device(self)
    }

    pub fn is_attached(&self) -> bool {
        self.motherboard().is_some()
    }

    /// The motherboard this device is attached to
    pub fn motherboard(&self) -> Option<Arc<Motherboard>> {
        self.identity.lock().motherboard()
    }

    // =========================================================================
    // Port Table
    // =========================================================================

    /// Bind `application` to `port`.
    ///
    /// Fails with [`Error::PortTaken`] when another application holds the
    /// port, [`Error::AlreadyBound`] when the application already holds a port,
    /// and [`Error::ForeignApplication`] when it lives on another device.
    pub fn register_application(&self, port: impl Into<Port>, application: &Application) -> Result<()> {
        let port = port.into();
        let result = if !std::ptr::eq(Arc::as_ptr(application.device()), self) {
            Err(Error::ForeignApplication {
                application: application.id(),
                owner: application.device().identifier(),
                device: self.identifier(),
            })
        } else {
            let identifier = self.identifier();
            self.ports
                .lock()
                .bind(identifier, port, application.id(), application.receiver())
        };

        match &result {
            Ok(()) => debug!(device = %self.identifier(), port = %port, application = %application.name(), "Application bound"),
            Err(e) => raise(self.sink(), e),
        }
        result
    }

    /// Free `port`, returning the application that held it
    pub fn unregister_application(&self, port: impl Into<Port>) -> Result<ApplicationId> {
        let port = port.into();
        self.ports.lock().release_port(port).ok_or_else(|| Error::NoListener {
            device: self.identifier(),
            port,
        })
    }

    /// Free whichever port `application` holds
    pub fn release_application(&self, application: ApplicationId) -> Option<Port> {
        self.ports.lock().release_application(application)
    }

    pub fn application_on(&self, port: impl Into<Port>) -> Option<ApplicationId> {
        self.ports.lock().holder_of(port.into())
    }

    pub fn port_of(&self, application: ApplicationId) -> Option<Port> {
        self.ports.lock().port_of(application)
    }

    pub fn is_application_bound(&self, application: ApplicationId) -> bool {
        self.port_of(application).is_some()
    }

    /// Copy of the port table
    pub fn port_table(&self) -> BTreeMap<Port, ApplicationId> {
        self.ports.lock().snapshot()
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Hand `message` to the application on its port
    pub fn route(&self, message: &Message) -> Result<()> {
        let receiver = self.ports.lock().receiver_on(message.port());
        match receiver {
            Some(receiver) => {
                receiver.on_message(message);
                Ok(())
            }
            None => {
                let err = Error::NoListener {
                    device: self.identifier(),
                    port: message.port(),
                };
                raise(self.sink(), &err);
                Err(err)
            }
        }
    }

    /// Broadcast-receive hook: hand `payload` to every bound application.
    /// Returns how many applications were reached.
    pub fn deliver_broadcast(&self, payload: &str) -> usize {
        let receivers = self.ports.lock().receivers();
        for receiver in &receivers {
            receiver.on_broadcast(payload);
        }
        receivers.len()
    }

    pub fn wants_broadcast(&self) -> bool {
        self.receive_broadcast.load(Ordering::Acquire)
    }

    pub fn set_wants_broadcast(&self, receive_broadcast: bool) {
        self.receive_broadcast.store(receive_broadcast, Ordering::Release);
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    fn require_motherboard(&self) -> Result<Arc<Motherboard>> {
        let mut identity = self.identity.lock();
        match identity.motherboard() {
            Some(motherboard) => Ok(motherboard),
            None => {
                let err = Error::NotAttached {
                    device: identity.identifier,
                };
                drop(identity);
                raise(self.sink(), &err);
                Err(err)
            }
        }
    }

    /// Send `message` up to the motherboard for delivery
    pub fn send(&self, message: &Message) -> Result<()> {
        self.require_motherboard()?.route_unicast(message)
    }

    /// Broadcast `payload` to every opted-in device on the motherboard.
    /// Returns how many devices were offered the payload.
    pub fn broadcast(&self, payload: &str) -> Result<usize> {
        if let Err(e) = validate_payload(payload) {
            raise(self.sink(), &e);
            return Err(e);
        }
        self.require_motherboard()?.route_broadcast(payload)
    }
}
