//! State management module
//! 
//! This module contains the timer engine, its records and the project registry.

pub mod app_state;
pub mod project_registry;
pub mod timer_engine;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use project_registry::ProjectRegistry;
pub use timer_engine::{StartOutcome, StopReason, TimerEngine, TimerEvent, DEFAULT_MAX_DURATION};
pub use timer_state::{StoppedSession, TimerSnapshot, TimerState};
