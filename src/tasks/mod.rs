//! Background tasks module
//! 
//! This module contains the tasks that run alongside the timer engine and the HTTP server.

pub mod cross_context_sync;
pub mod project_guard;
pub mod store_watcher;
pub mod timer_tick;

// Re-export main functions
pub use cross_context_sync::cross_context_sync_task;
pub use project_guard::project_guard_task;
pub use store_watcher::store_watcher_task;
pub use timer_tick::{spawn_timer_tick, TickHandle, TICK_PERIOD};
