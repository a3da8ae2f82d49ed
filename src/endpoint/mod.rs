//! Endpoint Module
//!
//! Devices and the applications multiplexed onto their ports.

pub mod application;
pub mod device;
mod port_table;

pub use application::Application;
pub use device::Device;
