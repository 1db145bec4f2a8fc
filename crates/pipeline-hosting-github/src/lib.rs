mod github;
mod wire;

pub use github::*;
