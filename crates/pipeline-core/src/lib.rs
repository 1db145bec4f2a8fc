pub mod cluster;
pub mod constants;
pub mod ids;
pub mod launch;
pub mod secret;
pub mod spotguide;
pub mod tree;

pub use cluster::*;
pub use constants::*;
pub use ids::*;
pub use launch::*;
pub use secret::*;
pub use spotguide::*;
pub use tree::*;
