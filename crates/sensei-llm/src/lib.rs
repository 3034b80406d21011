//! Language-model access for the assistant.
//!
//! [`LlmProvider`] is the transport seam; [`GeminiProvider`] is the real
//! backend and [`MockProvider`] (behind the `mock` feature) the test one.
//! [`Oracle`] layers the structured command/diagnosis prompting on top.

mod error;
mod gemini;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod oracle;
mod provider;

pub use error::{LlmError, Result};
pub use gemini::GeminiProvider;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockProvider;
pub use oracle::{NextStep, Oracle, OracleDiagnosis, OracleReply};
pub use provider::{LlmProvider, Message, Role};
