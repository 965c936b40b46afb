//! Point Timer - A local-first work timer for logging points against projects
//! 
//! This library provides the timer engine (persisted, resumable, coordinated
//! across execution contexts and capped at a maximum session length), the
//! stores it persists to, and the HTTP API that exposes it.

pub mod config;
pub mod state;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::{AppState, TimerEngine};
pub use api::create_router;
pub use utils::signals::shutdown_signal;
