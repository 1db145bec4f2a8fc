pub mod error;
pub mod memory;
pub mod traits;

pub use error::*;
pub use memory::*;
pub use traits::*;

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
