//! Core orchestration

pub mod fleet;

pub use fleet::{Fleet, FleetEvent};
