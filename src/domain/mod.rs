//! Domain layer - identifiers and port definitions
//!
//! The traits in [`ports`] are the seams where consuming code plugs into the
//! fabric: receive hooks for applications and a sink for diagnostics.

pub mod ids;
pub mod ports;

pub use ids::*;
pub use ports::*;
