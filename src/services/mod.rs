//! Persistence and session consumer services
//! 
//! This module contains the key/value stores the timer persists to and the
//! point log that consumes finished sessions.

pub mod file_store;
pub mod memory_store;
pub mod point_log;
pub mod store;

// Re-export main types
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use point_log::{PointEntry, PointLog};
pub use store::{ChangeSubscription, KeyValueStore, TimerChanges, TimerStore, TIMER_KEY};
