//! Device Fabric - Three-Layer Addressing and Routing
//!
//! Applications are multiplexed onto numbered ports of a device, devices are
//! registered under unique identifiers on a motherboard, and the motherboard
//! routes between them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            Motherboard                              │
//! │          device table: DeviceId → Device   (RwLock, one per board)  │
//! │     route_unicast(recipient) │        route_broadcast(opted-in)     │
//! ├──────────────────────────────┼──────────────────────────────────────┤
//! │  ┌────────────────────┐      │      ┌────────────────────┐          │
//! │  │  Device (id = 1)   │◄─────┴─────►│  Device (id = 2)   │          │
//! │  │  port table        │             │  port table        │          │
//! │  │  2 → App A         │             │  2 → App B         │          │
//! │  └─────────┬──────────┘             └─────────┬──────────┘          │
//! │            │ send / broadcast                 │ on_message          │
//! │       ┌────┴─────┐                       ┌────┴─────┐               │
//! │       │  App A   │                       │  App B   │               │
//! │       └──────────┘                       └──────────┘               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unicast: App → Device → Motherboard → Device → App on the addressed port.
//! Broadcast: App → Device → Motherboard → every opted-in Device → every
//! application bound on it.
//!
//! # Modules
//!
//! - [`message`]: addressed payloads and payload validation
//! - [`endpoint`]: devices and applications
//! - [`motherboard`]: the routing fabric, its events and counters
//! - [`domain`]: identifiers and the receive/diagnostic traits
//! - [`diagnostics`]: diagnostic sinks
//! - [`scenario`]: JSON-driven topologies for the binary
//! - [`error`]: error types and classification
//!
//! # Usage
//!
//! ```ignore
//! use device_fabric::{Application, Device, Message, Motherboard};
//!
//! let motherboard = Motherboard::new();
//! let x = Device::new(1, false);
//! let y = Device::new(2, true);
//! x.attach(&motherboard)?;
//! y.attach(&motherboard)?;
//!
//! let ping = Application::new("ping", &x, my_receiver);
//! let pong = Application::new("pong", &y, other_receiver);
//! ping.bind_port(2)?;
//! pong.bind_port(2)?;
//!
//! ping.send(&Message::create(2, 2, "101")?)?;
//! ping.broadcast("11")?;
//! ```

pub mod diagnostics;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod motherboard;
pub mod scenario;

// Re-export commonly used types
pub use diagnostics::{DiscardSink, MemorySink};
pub use domain::{ApplicationId, DeviceId, Diagnostic, DiagnosticSink, Port, Receiver};
pub use endpoint::{Application, Device};
pub use error::{Error, ErrorKind, PayloadDefect, Result};
pub use message::{is_binary_string, validate_payload, Message};
pub use motherboard::{
    FabricEvent, Motherboard, MotherboardConfig, RoutingStats, RoutingStatsSnapshot,
};
pub use scenario::{Fabric, Scenario, ScenarioReport, Step};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
