//! Motherboard Module
//!
//! The routing fabric between devices, plus the events and counters it
//! publishes while routing.

pub mod board;
pub mod events;
pub mod stats;

pub use board::{Motherboard, MotherboardConfig, DEFAULT_EVENT_CAPACITY};
pub use events::FabricEvent;
pub use stats::{RoutingStats, RoutingStatsSnapshot};

pub(crate) use board::Rekey;
