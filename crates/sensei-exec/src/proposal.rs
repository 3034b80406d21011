use serde::{Deserialize, Serialize};

/// A candidate shell command together with where it came from.
///
/// Proposals enter the pipeline from the language model, from a
/// diagnoser-suggested fix, or verbatim from the user. The orchestrator
/// treats all three identically: every proposal is classified before it
/// can reach the runner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandProposal {
    /// The shell command text, passed to `$SHELL -c` as-is.
    pub text: String,
    /// The natural-language request (or failing command) that produced this.
    pub originating_query: String,
    /// One or two sentences of human-readable rationale.
    pub explanation: String,
}

impl CommandProposal {
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        originating_query: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            originating_query: originating_query.into(),
            explanation: explanation.into(),
        }
    }

    /// A proposal typed directly by the user, bypassing the model.
    #[must_use]
    pub fn verbatim(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            originating_query: text.clone(),
            explanation: String::new(),
            text,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
