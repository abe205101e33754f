//! SNMP protocol layer: values, OIDs, wire codec and the agent engine

pub mod codec;
pub mod engine;
pub mod oid;
pub mod persist;
pub mod scope;
pub mod vacm;
pub mod value;

pub use engine::{MoServer, WORKER_POOL_SIZE};
pub use oid::Oid;
pub use value::{Variable, VariableBinding};
