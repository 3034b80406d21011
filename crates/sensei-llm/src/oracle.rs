//! Structured prompting on top of a raw [`LlmProvider`].
//!
//! The oracle asks for strict JSON and parses it defensively: models
//! love to wrap JSON in markdown fences no matter how firmly told not to.

use serde::Deserialize;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

const PROPOSE_SYSTEM_PROMPT: &str = "\
You are a Linux terminal expert. Translate the user's natural-language \
request into a single shell command for their system.

Respond with ONLY a JSON object, no markdown, in this exact shape:
{
  \"command\": \"the shell command\",
  \"explanation\": \"one or two sentences on what it does\",
  \"warning\": \"caution text, or empty string if none\",
  \"next_steps\": [
    {\"command\": \"a likely follow-up command\", \"description\": \"why\"}
  ]
}

Rules:
- One command only; chain with && if several steps are unavoidable.
- Prefer the system's own package manager and installed tools.
- next_steps holds at most 3 entries and may be empty.";

const DIAGNOSE_SYSTEM_PROMPT: &str = "\
You are a Linux troubleshooting expert. A shell command just failed. \
Explain why and, when a single command can fix it, provide that command.

Respond with ONLY a JSON object, no markdown, in this exact shape:
{
  \"diagnosis\": \"what went wrong, in plain language\",
  \"fix_command\": \"a command that fixes it, or empty string\",
  \"explanation\": \"what the fix does\"
}";

/// A command proposal parsed from the model.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct OracleReply {
    pub command: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub warning: String,
    #[serde(default)]
    pub next_steps: Vec<NextStep>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NextStep {
    pub command: String,
    #[serde(default)]
    pub description: String,
}

/// A failure explanation parsed from the model.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct OracleDiagnosis {
    pub diagnosis: String,
    #[serde(default)]
    pub fix_command: String,
    #[serde(default)]
    pub explanation: String,
}

/// Wraps a provider with the two structured asks the assistant needs.
#[derive(Clone, Debug)]
pub struct Oracle<P> {
    provider: P,
}

impl<P: LlmProvider> Oracle<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Translate a natural-language request into a command proposal.
    ///
    /// `context` is pre-rendered host context (system profile, cwd,
    /// recent history) and is sent as a second system message.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or unparseable output.
    pub async fn propose(&self, query: &str, context: &str) -> Result<OracleReply, LlmError> {
        let messages = [
            Message::system(PROPOSE_SYSTEM_PROMPT),
            Message::system(context),
            Message::user(query),
        ];
        let raw = self.provider.chat(&messages).await?;
        let reply: OracleReply = parse_json_reply(&raw)?;
        if reply.command.trim().is_empty() {
            return Err(LlmError::StructuredParse(
                "model returned an empty command".into(),
            ));
        }
        tracing::debug!(command = %reply.command, "oracle proposed command");
        Ok(reply)
    }

    /// Ask the model to explain a failed command.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or unparseable output.
    pub async fn diagnose_failure(
        &self,
        command: &str,
        exit_code: i32,
        stderr: &str,
        context: &str,
    ) -> Result<OracleDiagnosis, LlmError> {
        let prompt = format!(
            "Command: {command}\nExit code: {exit_code}\nStderr:\n{stderr}"
        );
        let messages = [
            Message::system(DIAGNOSE_SYSTEM_PROMPT),
            Message::system(context),
            Message::user(prompt),
        ];
        let raw = self.provider.chat(&messages).await?;
        parse_json_reply(&raw)
    }
}

fn parse_json_reply<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, LlmError> {
    let stripped = strip_json_fences(raw);
    serde_json::from_str(stripped).map_err(|e| {
        tracing::warn!(raw, "failed to parse oracle reply");
        LlmError::StructuredParse(e.to_string())
    })
}

/// Remove a surrounding ```json / ``` fence if present.
fn strip_json_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
