//! The cycle-synchronized idle-shutdown engine.

pub mod acquire;
pub mod actuator;
pub mod config;
pub mod debounce;
pub mod phase;
pub mod scheduler;
pub mod status;

pub use config::{ConfigError, EngineConfig, load_from_json};
pub use scheduler::{EngineError, IdleShutdown, Outcome, TimeoutReason};
pub use status::{StatusEvent, StatusSink};
