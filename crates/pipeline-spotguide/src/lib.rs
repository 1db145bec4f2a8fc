//! Spotguide catalog, upstream scraping and the launch flow that turns a
//! template into a CI-enabled repository.

pub mod catalog;
pub mod content;
pub mod error;
pub mod fixtures;
pub mod launch;
pub mod scraper;

pub use catalog::*;
pub use content::*;
pub use error::*;
pub use launch::*;
pub use scraper::*;
