//! Snmpfleet - SNMP agent fleet simulator
//!
//! Exposes many virtual SNMP agents from a single process, each bound to its
//! own UDP endpoint and answering GET/GETNEXT/GETBULK/SET requests from a
//! captured walk, optionally mutated by per-OID modifiers so counters and
//! gauges evolve between reads like on real hardware.

pub mod agent;
pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod modifier;
pub mod snmp;
pub mod store;
pub mod utils;

pub use error::{Error, Result};

/// Simulator version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
