mod drone;

pub use drone::*;
