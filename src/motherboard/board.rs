//! Motherboard
//!
//! The routing fabric. Owns the identifier→device table, resolves unicast
//! messages by recipient and fans broadcasts out to opted-in devices.

use crate::diagnostics::{raise, DiscardSink};
use crate::domain::{DeviceId, DiagnosticSink};
use crate::endpoint::Device;
use crate::error::{Error, Result};
use crate::message::{validate_payload, Message};
use crate::motherboard::events::FabricEvent;
use crate::motherboard::stats::{RoutingStats, RoutingStatsSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

static NEXT_BOARD: AtomicU64 = AtomicU64::new(0);

/// Configuration for a motherboard
#[derive(Debug, Clone)]
pub struct MotherboardConfig {
    /// Name used in diagnostics
    pub name: String,
    /// Events buffered per subscriber before the slowest one lags
    pub event_capacity: usize,
}

impl Default for MotherboardConfig {
    fn default() -> Self {
        Self {
            name: format!("mb-{}", NEXT_BOARD.fetch_add(1, Ordering::Relaxed)),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Outcome of re-keying a device, for the device's retry loop
pub(crate) enum Rekey {
    Done,
    /// The device is no longer linked to this motherboard
    Unlinked,
}

// =============================================================================
// Motherboard
// =============================================================================

/// Routing fabric between devices
pub struct Motherboard {
    config: MotherboardConfig,
    /// Device table
    devices: RwLock<HashMap<DeviceId, Arc<Device>>>,
    created_at: DateTime<Utc>,
    stats: RoutingStats,
    /// Event broadcaster
    event_sender: broadcast::Sender<FabricEvent>,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for Motherboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Motherboard")
            .field("name", &self.config.name)
            .field("devices", &self.devices.read().len())
            .finish()
    }
}

impl Motherboard {
    /// Create a motherboard with no devices
    pub fn new() -> Arc<Self> {
        Self::with_config(MotherboardConfig::default())
    }

    pub fn with_config(config: MotherboardConfig) -> Arc<Self> {
        Self::with_sink(config, DiscardSink::shared())
    }

    /// Create a motherboard reporting diagnostics to `sink`
    pub fn with_sink(config: MotherboardConfig, sink: Arc<dyn DiagnosticSink>) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new(Self {
            config,
            devices: RwLock::new(HashMap::new()),
            created_at: Utc::now(),
            stats: RoutingStats::default(),
            event_sender,
            sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<FabricEvent> {
        self.event_sender.subscribe()
    }

    /// Get routing statistics
    pub fn stats(&self) -> RoutingStatsSnapshot {
        self.stats.snapshot()
    }

    fn emit(&self, event: FabricEvent) {
        // No subscribers is fine
        let _ = self.event_sender.send(event);
    }

    // =========================================================================
    // Device Table
    // =========================================================================

    /// Insert `device` under its current identifier and link it back here.
    ///
    /// Fails with [`Error::DeviceIdConflict`] when the identifier is taken and
    /// [`Error::AlreadyAttached`] when the device is linked to another
    /// motherboard.
    pub fn attach_device(self: &Arc<Self>, device: &Arc<Device>) -> Result<()> {
        let mut devices = self.devices.write();
        let mut identity = device.identity();
        let id = identity.identifier;

        if devices.contains_key(&id) {
            return Err(Error::DeviceIdConflict {
                device: id,
                motherboard: self.config.name.clone(),
            });
        }
        if let Some(current) = identity.motherboard() {
            return Err(Error::AlreadyAttached {
                device: id,
                motherboard: current.name().to_string(),
            });
        }

        identity.link(self);
        devices.insert(id, Arc::clone(device));
        drop(identity);
        drop(devices);

        RoutingStats::bump(&self.stats.attaches);
        info!(motherboard = %self.config.name, device = %id, "Device attached");
        self.emit(FabricEvent::DeviceAttached { device: id });
        Ok(())
    }

    /// Remove the device registered under `id`; it returns to unattached
    pub fn detach_device(&self, id: impl Into<DeviceId>) -> Result<Arc<Device>> {
        let id = id.into();
        let mut devices = self.devices.write();
        let Some(device) = devices.remove(&id) else {
            return Err(Error::NoSuchRecipient {
                device: id,
                motherboard: self.config.name.clone(),
            });
        };
        {
            let mut identity = device.identity();
            if identity.is_linked_to(self) {
                identity.unlink();
            }
        }
        drop(devices);

        RoutingStats::bump(&self.stats.detaches);
        info!(motherboard = %self.config.name, device = %id, "Device detached");
        self.emit(FabricEvent::DeviceDetached { device: id });
        Ok(device)
    }

    /// Move `device` from its current key to `to` in one critical section
    pub(crate) fn rekey_device(&self, device: &Device, to: DeviceId) -> Result<Rekey> {
        let mut devices = self.devices.write();
        let mut identity = device.identity();
        if !identity.is_linked_to(self) {
            return Ok(Rekey::Unlinked);
        }

        let from = identity.identifier;
        if devices.contains_key(&to) {
            drop(identity);
            drop(devices);
            let err = Error::DeviceIdConflict {
                device: to,
                motherboard: self.config.name.clone(),
            };
            raise(self.sink.as_ref(), &err);
            return Err(err);
        }

        let Some(entry) = devices.remove(&from) else {
            identity.unlink();
            return Ok(Rekey::Unlinked);
        };
        identity.identifier = to;
        devices.insert(to, entry);
        drop(identity);
        drop(devices);

        RoutingStats::bump(&self.stats.renames);
        info!(motherboard = %self.config.name, from = %from, to = %to, "Device renamed");
        self.emit(FabricEvent::DeviceRenamed { from, to });
        Ok(Rekey::Done)
    }

    pub fn has_device(&self, id: impl Into<DeviceId>) -> bool {
        self.devices.read().contains_key(&id.into())
    }

    pub fn device(&self, id: impl Into<DeviceId>) -> Option<Arc<Device>> {
        self.devices.read().get(&id.into()).cloned()
    }

    /// All attached identifiers, ascending
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Copy of the device table
    pub fn devices(&self) -> BTreeMap<DeviceId, Arc<Device>> {
        self.devices
            .read()
            .iter()
            .map(|(id, device)| (*id, Arc::clone(device)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Deliver `message` to the device named by its recipient
    pub fn route_unicast(&self, message: &Message) -> Result<()> {
        let device = self.devices.read().get(&message.recipient()).cloned();
        let result = match device {
            Some(device) => device.route(message),
            None => {
                let err = Error::NoSuchRecipient {
                    device: message.recipient(),
                    motherboard: self.config.name.clone(),
                };
                raise(self.sink.as_ref(), &err);
                Err(err)
            }
        };

        match &result {
            Ok(()) => {
                RoutingStats::bump(&self.stats.unicast_delivered);
                debug!(recipient = %message.recipient(), port = %message.port(), "Unicast delivered");
                self.emit(FabricEvent::UnicastDelivered {
                    recipient: message.recipient(),
                    port: message.port(),
                });
            }
            Err(e) => {
                RoutingStats::bump(&self.stats.unicast_dropped);
                self.emit(FabricEvent::UnicastDropped {
                    recipient: message.recipient(),
                    port: message.port(),
                    reason: e.kind(),
                });
            }
        }
        result
    }

    /// Offer `payload` to every device that wants broadcasts.
    ///
    /// Best-effort: once the payload is valid this succeeds, whatever each
    /// device does with it. Returns how many devices were offered the payload.
    pub fn route_broadcast(&self, payload: &str) -> Result<usize> {
        if let Err(e) = validate_payload(payload) {
            raise(self.sink.as_ref(), &e);
            return Err(e);
        }

        let mut targets: Vec<(DeviceId, Arc<Device>)> = self
            .devices
            .read()
            .iter()
            .filter(|(_, device)| device.wants_broadcast())
            .map(|(id, device)| (*id, Arc::clone(device)))
            .collect();
        targets.sort_unstable_by_key(|(id, _)| *id);

        let applications: usize = targets
            .iter()
            .map(|(_, device)| device.deliver_broadcast(payload))
            .sum();

        RoutingStats::bump(&self.stats.broadcasts);
        self.stats
            .broadcast_deliveries
            .fetch_add(applications as u64, Ordering::Relaxed);
        debug!(devices = targets.len(), applications, "Broadcast fanned out");
        self.emit(FabricEvent::BroadcastFannedOut {
            devices: targets.len(),
            applications,
        });
        Ok(targets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use crate::domain::Port;
    use crate::endpoint::testing::RecordingReceiver;
    use crate::error::ErrorKind;
    use assert_matches::assert_matches;

    #[test]
    fn test_attach_device() {
        let motherboard = Motherboard::new();
        let device = Device::new(0, true);
        let duplicate = Device::new(0, false);

        motherboard.attach_device(&device).unwrap();
        assert_matches!(motherboard.attach_device(&device), Err(Error::DeviceIdConflict { .. }));
        assert_matches!(motherboard.attach_device(&duplicate), Err(Error::DeviceIdConflict { .. }));
        assert!(device.is_attached());
        assert!(Arc::ptr_eq(&device.motherboard().unwrap(), &motherboard));
    }

    #[test]
    fn test_attach_to_second_motherboard_rejected() {
        let first = Motherboard::new();
        let second = Motherboard::new();
        let device = Device::new(1, false);

        device.attach(&first).unwrap();
        assert_matches!(second.attach_device(&device), Err(Error::AlreadyAttached { .. }));
        assert!(!second.has_device(1));
    }

    #[test]
    fn test_detach_device_twice() {
        let motherboard = Motherboard::new();
        let device = Device::new(0, true);
        motherboard.attach_device(&device).unwrap();

        assert_matches!(motherboard.detach_device(1), Err(Error::NoSuchRecipient { .. }));
        let removed = motherboard.detach_device(0).unwrap();
        assert!(Arc::ptr_eq(&removed, &device));
        assert_matches!(motherboard.detach_device(0), Err(Error::NoSuchRecipient { .. }));

        // Removed devices outlive the table entry and can attach again
        assert!(!device.is_attached());
        device.attach(&motherboard).unwrap();
    }

    #[test]
    fn test_devices_snapshot() {
        let motherboard = Motherboard::new();
        let one = Device::new(1, true);
        let two = Device::new(2, false);
        motherboard.attach_device(&one).unwrap();
        motherboard.attach_device(&two).unwrap();

        let devices = motherboard.devices();
        assert_eq!(devices.len(), 2);
        assert!(Arc::ptr_eq(&devices[&DeviceId(1)], &one));
        assert!(Arc::ptr_eq(&devices[&DeviceId(2)], &two));
        assert_eq!(motherboard.device_ids(), vec![DeviceId(1), DeviceId(2)]);
        assert_eq!(motherboard.len(), 2);
    }

    #[test]
    fn test_has_device() {
        let motherboard = Motherboard::new();
        motherboard.attach_device(&Device::new(1, true)).unwrap();
        assert!(motherboard.has_device(1));
        assert!(!motherboard.has_device(3));
    }

    #[test]
    fn test_route_unicast() {
        let sink = MemorySink::new();
        let motherboard = Motherboard::with_sink(MotherboardConfig::default(), sink.clone());
        let message = Message::create(1, 1, "100").unwrap();

        assert_matches!(motherboard.route_unicast(&message), Err(Error::NoSuchRecipient { .. }));
        let diagnostic = sink.last().unwrap();
        assert_eq!(diagnostic.kind, ErrorKind::NoSuchRecipient);
        assert!(diagnostic.message.contains("no device with ID 1"));

        let device = Device::new(1, false);
        motherboard.attach_device(&device).unwrap();
        assert_matches!(motherboard.route_unicast(&message), Err(Error::NoListener { .. }));

        let (app, inbox) = RecordingReceiver::application("app", &device);
        app.bind_port(1).unwrap();
        motherboard.route_unicast(&message).unwrap();
        assert_eq!(inbox.messages(), vec![message]);

        let stats = motherboard.stats();
        assert_eq!(stats.unicast_delivered, 1);
        assert_eq!(stats.unicast_dropped, 2);
    }

    #[test]
    fn test_route_broadcast_validates() {
        let sink = MemorySink::new();
        let motherboard = Motherboard::with_sink(MotherboardConfig::default(), sink.clone());
        motherboard.attach_device(&Device::new(1, true)).unwrap();

        assert_eq!(motherboard.route_broadcast("100").unwrap(), 1);
        assert!(sink.is_empty());

        assert_matches!(motherboard.route_broadcast("not binary"), Err(Error::InvalidPayload { .. }));
        assert!(sink.last().unwrap().message.contains("binary string"));
        assert_matches!(motherboard.route_broadcast(""), Err(Error::InvalidPayload { .. }));
    }

    #[test]
    fn test_broadcast_opt_out() {
        let motherboard = Motherboard::new();
        let opted_in = Device::new(1, true);
        let opted_out = Device::new(2, false);
        motherboard.attach_device(&opted_in).unwrap();
        motherboard.attach_device(&opted_out).unwrap();

        let (listening, inbox_in) = RecordingReceiver::application("in", &opted_in);
        let (ignoring, inbox_out) = RecordingReceiver::application("out", &opted_out);
        listening.bind_port(1).unwrap();
        ignoring.bind_port(1).unwrap();

        assert_eq!(motherboard.route_broadcast("11").unwrap(), 1);
        assert_eq!(inbox_in.broadcasts(), vec!["11".to_string()]);
        assert!(inbox_out.broadcasts().is_empty());

        // Devices with nobody listening still count as offered
        listening.unbind().unwrap();
        assert_eq!(motherboard.route_broadcast("11").unwrap(), 1);
        assert_eq!(motherboard.stats().broadcast_deliveries, 1);
    }

    #[test]
    fn test_rename_is_atomic_for_observers() {
        let motherboard = Motherboard::new();
        let device = Device::new(3, false);
        let blocker = Device::new(5, false);
        device.attach(&motherboard).unwrap();
        blocker.attach(&motherboard).unwrap();

        device.set_identifier(7).unwrap();
        assert!(!motherboard.has_device(3));
        assert!(Arc::ptr_eq(&motherboard.device(7).unwrap(), &device));

        assert_matches!(device.set_identifier(5), Err(Error::DeviceIdConflict { .. }));
        assert_eq!(device.identifier(), DeviceId(7));
        assert!(Arc::ptr_eq(&motherboard.device(5).unwrap(), &blocker));
        assert_eq!(motherboard.stats().renames, 1);
    }

    #[test]
    fn test_rename_after_detach_is_free() {
        let motherboard = Motherboard::new();
        let device = Device::new(3, false);
        let squatter = Device::new(7, false);
        device.attach(&motherboard).unwrap();
        squatter.attach(&motherboard).unwrap();

        motherboard.detach_device(3).unwrap();
        device.set_identifier(7).unwrap();
        assert_eq!(device.identifier(), DeviceId(7));
        assert!(Arc::ptr_eq(&motherboard.device(7).unwrap(), &squatter));
    }

    #[test]
    fn test_events() {
        let motherboard = Motherboard::new();
        let mut events = motherboard.subscribe();

        let device = Device::new(1, true);
        device.attach(&motherboard).unwrap();
        device.set_identifier(2).unwrap();
        let _ = motherboard.route_unicast(&Message::new(2, 9, "1"));
        motherboard.route_broadcast("1").unwrap();
        motherboard.detach_device(2).unwrap();

        let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(
            received,
            vec![
                FabricEvent::DeviceAttached { device: DeviceId(1) },
                FabricEvent::DeviceRenamed {
                    from: DeviceId(1),
                    to: DeviceId(2)
                },
                FabricEvent::UnicastDropped {
                    recipient: DeviceId(2),
                    port: Port(9),
                    reason: ErrorKind::NoListener
                },
                FabricEvent::BroadcastFannedOut {
                    devices: 1,
                    applications: 0
                },
                FabricEvent::DeviceDetached { device: DeviceId(2) },
            ]
        );
    }

    #[test]
    fn test_hooks_may_reenter() {
        use crate::domain::Receiver;

        // Echoes every message back to device 1 port 1
        struct Echo {
            device: Arc<Device>,
        }
        impl Receiver for Echo {
            fn on_message(&self, message: &Message) {
                if message.recipient() == DeviceId(2) {
                    let _ = self.device.send(&Message::new(1, 1, message.payload()));
                }
            }
            fn on_broadcast(&self, _payload: &str) {}
        }

        let motherboard = Motherboard::new();
        let x = Device::new(1, false);
        let y = Device::new(2, false);
        x.attach(&motherboard).unwrap();
        y.attach(&motherboard).unwrap();

        let (origin, inbox) = RecordingReceiver::application("origin", &x);
        origin.bind_port(1).unwrap();
        let echo = crate::endpoint::Application::new("echo", &y, Arc::new(Echo { device: y.clone() }));
        echo.bind_port(1).unwrap();

        origin.send(&Message::new(2, 1, "1010")).unwrap();
        assert_eq!(inbox.messages(), vec![Message::new(1, 1, "1010")]);
    }

    #[test]
    fn test_concurrent_ring_of_sends() {
        let motherboard = Motherboard::new();
        let mut devices = Vec::new();
        let mut apps = Vec::new();
        let mut inboxes = Vec::new();
        for i in 0..100u16 {
            let device = Device::new(u32::from(i), true);
            let (app, inbox) = RecordingReceiver::application("node", &device);
            app.bind_port(i).unwrap();
            device.attach(&motherboard).unwrap();
            devices.push(device);
            apps.push(app);
            inboxes.push(inbox);
        }

        std::thread::scope(|scope| {
            for (i, app) in apps.iter().enumerate() {
                scope.spawn(move || {
                    let next = ((i + 1) % 100) as u16;
                    app.send(&Message::new(u32::from(next), next, "100")).unwrap();
                });
            }
        });

        for inbox in &inboxes {
            assert_eq!(inbox.messages().len(), 1);
        }
        assert_eq!(motherboard.stats().unicast_delivered, 100);
    }

    #[test]
    fn test_concurrent_attach_with_colliding_ids() {
        let motherboard = Motherboard::new();
        let contenders: Vec<_> = (0..16).map(|_| Device::new(42, false)).collect();

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = contenders
                .iter()
                .map(|device| {
                    let motherboard = &motherboard;
                    scope.spawn(move || device.attach(motherboard).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(winners, 1);
        assert_eq!(motherboard.len(), 1);
        assert_eq!(contenders.iter().filter(|d| d.is_attached()).count(), 1);
    }

    #[test]
    fn test_concurrent_renames_never_lose_a_device() {
        let motherboard = Motherboard::new();
        let devices: Vec<_> = (0..8u32).map(|i| Device::new(i, false)).collect();
        for device in &devices {
            device.attach(&motherboard).unwrap();
        }

        std::thread::scope(|scope| {
            for (i, device) in devices.iter().enumerate() {
                scope.spawn(move || {
                    for round in 0..50u32 {
                        // Everybody fights over the same small id range
                        let _ = device.set_identifier(100 + (round + i as u32) % 12);
                    }
                });
            }
        });

        assert_eq!(motherboard.len(), devices.len());
        for device in &devices {
            let id = device.identifier();
            assert!(Arc::ptr_eq(&motherboard.device(id).unwrap(), device));
        }
    }
}
