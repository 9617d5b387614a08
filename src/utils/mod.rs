// src/utils/mod.rs

pub mod error;
pub mod logger;
pub mod time;

// Re-export commonly used items
pub use error::{ErrorKind, SyncError, SyncResult};
pub use logger::*;
