//! Walk-backed managed object store

pub mod group;
pub mod modified;
pub mod roots;
pub mod walk;

pub use group::{MoGroup, StoredVariable};
pub use modified::ModifiedVariable;
