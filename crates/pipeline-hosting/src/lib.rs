//! Contracts for the repository-hosting and CI-hosting services.

pub mod error;
pub mod memory;
pub mod pagination;
pub mod types;

pub use error::*;
pub use memory::*;
pub use pagination::*;
pub use types::*;
