//! Session layer: configuration and the ask/confirm conversation loop
//! that wires the language model to the safety-gated execution pipeline.

mod config;
mod error;
mod session;

pub use config::{Config, LearningConfig, LlmConfig, ProfileConfig};
pub use error::SessionError;
pub use session::{Session, TurnOutput};
