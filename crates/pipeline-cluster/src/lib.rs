//! Resolution of persisted cluster records into provider-specific cluster handles.

pub mod cluster;
pub mod error;
pub mod factory;
pub mod manager;
pub mod providers;

pub use cluster::*;
pub use error::*;
pub use factory::*;
pub use manager::*;
