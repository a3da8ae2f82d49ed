//! Scenarios
//!
//! A [`Scenario`] is a JSON description of a topology (devices and the
//! applications bound on them) plus a script of steps to drive through it.
//! The binary uses it to exercise the fabric end to end.
//!
//! ```json
//! {
//!   "motherboard": "lab",
//!   "devices": [
//!     { "id": 1, "receive_broadcast": true, "applications": [{ "name": "ping", "port": 2 }] },
//!     { "id": 2, "applications": [{ "name": "pong", "port": 2 }] }
//!   ],
//!   "steps": [
//!     { "action": "send", "from": "ping", "recipient": 2, "port": 2, "payload": "101" },
//!     { "action": "broadcast", "from": "pong", "payload": "11" },
//!     { "action": "rename", "device": 1, "to": 5 }
//!   ]
//! }
//! ```

use crate::domain::{DeviceId, Port, Receiver};
use crate::endpoint::{Application, Device};
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::motherboard::{Motherboard, MotherboardConfig, RoutingStatsSnapshot, DEFAULT_EVENT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Scenario Description
// =============================================================================

/// A topology and the steps to run through it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Motherboard name
    #[serde(default = "default_motherboard_name")]
    pub motherboard: String,
    /// Event channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_motherboard_name() -> String {
    "motherboard".to_string()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// One device in the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: DeviceId,
    #[serde(default)]
    pub receive_broadcast: bool,
    #[serde(default)]
    pub applications: Vec<ApplicationSpec>,
}

/// One application; names are unique across the scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub name: String,
    /// Port to bind at start; unbound when absent
    #[serde(default)]
    pub port: Option<Port>,
}

/// A scripted action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Unicast from a named application; the payload is validated
    Send {
        from: String,
        recipient: DeviceId,
        port: Port,
        payload: String,
    },
    /// Broadcast from a named application
    Broadcast { from: String, payload: String },
    /// Bind a named application to a port
    Bind { application: String, port: Port },
    /// Release a named application's port
    Unbind { application: String },
    /// Change the identifier of the device currently attached as `device`
    Rename { device: DeviceId, to: DeviceId },
    /// Remove a device from the motherboard
    Detach { device: DeviceId },
    /// Toggle a device's broadcast opt-in
    SetBroadcast { device: DeviceId, enabled: bool },
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Send {
                from,
                recipient,
                port,
                payload,
            } => write!(f, "send {payload} from {from} to {recipient}:{port}"),
            Step::Broadcast { from, payload } => write!(f, "broadcast {payload} from {from}"),
            Step::Bind { application, port } => write!(f, "bind {application} to port {port}"),
            Step::Unbind { application } => write!(f, "unbind {application}"),
            Step::Rename { device, to } => write!(f, "rename device {device} to {to}"),
            Step::Detach { device } => write!(f, "detach device {device}"),
            Step::SetBroadcast { device, enabled } => {
                write!(f, "set broadcast opt-in of device {device} to {enabled}")
            }
        }
    }
}

impl Scenario {
    /// Read and validate a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Parse and validate a scenario
    pub fn from_json(raw: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(raw)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// `count` devices in a ring: device i runs `node-i` on port i, sends
    /// "1" to its successor, then node-0 broadcasts "11"
    pub fn ring(count: u16) -> Self {
        let devices = (0..count)
            .map(|i| DeviceSpec {
                id: DeviceId(u32::from(i)),
                receive_broadcast: true,
                applications: vec![ApplicationSpec {
                    name: format!("node-{i}"),
                    port: Some(Port(i)),
                }],
            })
            .collect();

        let mut steps: Vec<Step> = (0..count)
            .map(|i| {
                let next = (i + 1) % count;
                Step::Send {
                    from: format!("node-{i}"),
                    recipient: DeviceId(u32::from(next)),
                    port: Port(next),
                    payload: "1".to_string(),
                }
            })
            .collect();
        if count > 0 {
            steps.push(Step::Broadcast {
                from: "node-0".to_string(),
                payload: "11".to_string(),
            });
        }

        Self {
            motherboard: "ring".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            devices,
            steps,
        }
    }

    /// Reject duplicate device ids and application names
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.id) {
                return Err(Error::Configuration(format!(
                    "device ID {} appears more than once",
                    device.id
                )));
            }
            for app in &device.applications {
                if !names.insert(app.name.as_str()) {
                    return Err(Error::Configuration(format!(
                        "application name {} appears more than once",
                        app.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Wire up the topology: attach every device, bind every application
    pub fn build(&self) -> Result<Fabric> {
        self.validate()?;
        let motherboard = Motherboard::with_config(MotherboardConfig {
            name: self.motherboard.clone(),
            event_capacity: self.event_capacity,
        });

        let mut applications = BTreeMap::new();
        let mut inboxes = HashMap::new();
        for spec in &self.devices {
            let device = Device::new(spec.id, spec.receive_broadcast);
            device.attach(&motherboard)?;
            for app_spec in &spec.applications {
                let inbox = Arc::new(CountingReceiver::new(&app_spec.name));
                let app = Application::new(&app_spec.name, &device, inbox.clone());
                if let Some(port) = app_spec.port {
                    app.bind_port(port)?;
                }
                inboxes.insert(app_spec.name.clone(), inbox);
                applications.insert(app_spec.name.clone(), app);
            }
        }

        info!(
            motherboard = %self.motherboard,
            devices = self.devices.len(),
            applications = applications.len(),
            "Scenario topology built"
        );
        Ok(Fabric {
            motherboard,
            applications,
            inboxes,
        })
    }
}

// =============================================================================
// Receivers
// =============================================================================

/// Receiver that logs and counts what it gets
#[derive(Debug)]
pub struct CountingReceiver {
    name: String,
    messages: AtomicU64,
    broadcasts: AtomicU64,
}

impl CountingReceiver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            messages: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
        }
    }

    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }
}

impl Receiver for CountingReceiver {
    fn on_message(&self, message: &Message) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        info!(application = %self.name, port = %message.port(), payload = %message.payload(), "Message received");
    }

    fn on_broadcast(&self, payload: &str) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        info!(application = %self.name, payload = %payload, "Broadcast received");
    }
}

// =============================================================================
// Running
// =============================================================================

/// A wired-up topology ready to run steps
pub struct Fabric {
    motherboard: Arc<Motherboard>,
    applications: BTreeMap<String, Application>,
    inboxes: HashMap<String, Arc<CountingReceiver>>,
}

/// What one step did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Per-application receive counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxCount {
    pub messages: u64,
    pub broadcasts: u64,
}

/// Result of running a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub inboxes: BTreeMap<String, InboxCount>,
    pub stats: RoutingStatsSnapshot,
}

impl ScenarioReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.ok).count()
    }
}

impl Fabric {
    pub fn motherboard(&self) -> &Arc<Motherboard> {
        &self.motherboard
    }

    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.get(name)
    }

    fn named(&self, name: &str) -> Result<&Application> {
        self.applications
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("unknown application {name}")))
    }

    fn attached(&self, id: DeviceId) -> Result<Arc<Device>> {
        self.motherboard.device(id).ok_or_else(|| Error::NoSuchRecipient {
            device: id,
            motherboard: self.motherboard.name().to_string(),
        })
    }

    /// Perform one step
    pub fn apply(&self, step: &Step) -> Result<()> {
        match step {
            Step::Send {
                from,
                recipient,
                port,
                payload,
            } => {
                let message = Message::create(*recipient, *port, payload.as_str())?;
                self.named(from)?.send(&message)
            }
            Step::Broadcast { from, payload } => self.named(from)?.broadcast(payload).map(|_| ()),
            Step::Bind { application, port } => self.named(application)?.bind_port(*port),
            Step::Unbind { application } => self.named(application)?.unbind().map(|_| ()),
            Step::Rename { device, to } => self.attached(*device)?.set_identifier(*to),
            Step::Detach { device } => self.motherboard.detach_device(*device).map(|_| ()),
            Step::SetBroadcast { device, enabled } => {
                self.attached(*device)?.set_wants_broadcast(*enabled);
                Ok(())
            }
        }
    }

    /// Run every step in order; failures are recorded, not fatal
    pub fn run(&self, steps: &[Step]) -> ScenarioReport {
        let outcomes = steps
            .iter()
            .map(|step| {
                let outcome = match self.apply(step) {
                    Ok(()) => StepOutcome {
                        step: step.to_string(),
                        ok: true,
                        error: None,
                        detail: None,
                    },
                    Err(e) => StepOutcome {
                        step: step.to_string(),
                        ok: false,
                        error: Some(e.kind()),
                        detail: Some(e.to_string()),
                    },
                };
                debug!(step = %outcome.step, ok = outcome.ok, "Step finished");
                outcome
            })
            .collect();

        let inboxes = self
            .inboxes
            .iter()
            .map(|(name, inbox)| {
                (
                    name.clone(),
                    InboxCount {
                        messages: inbox.messages(),
                        broadcasts: inbox.broadcasts(),
                    },
                )
            })
            .collect();

        ScenarioReport {
            outcomes,
            inboxes,
            stats: self.motherboard.stats(),
        }
    }
}
