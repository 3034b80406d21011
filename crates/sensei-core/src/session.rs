//! The conversation loop: natural language in, supervised execution out.
//!
//! A [`Session`] owns one [`Oracle`] and one [`Orchestrator`] and glues
//! them together. It builds the host context sent with every model call,
//! remembers the follow-up suggestions from the last answer, and, when a
//! turn exhausts its retries, asks the model for a human-readable
//! post-mortem. That diagnosis is presentation only; what actually ran
//! (and what retried) was decided by the execution pipeline alone.

use std::collections::VecDeque;
use std::fmt::Write as _;

use tokio_util::sync::CancellationToken;

use sensei_exec::{CommandProposal, CommandRunner, EventSink, Orchestrator, TurnProgress};
use sensei_llm::{LlmProvider, NextStep, Oracle, OracleDiagnosis};

use crate::error::SessionError;

const RECENT_CAP: usize = 5;
const NEXT_STEP_CAP: usize = 3;

/// Everything the UI needs to render one turn.
#[derive(Debug)]
pub struct TurnOutput {
    pub progress: TurnProgress,
    /// Model's explanation of the proposed command, when one was asked for.
    pub explanation: Option<String>,
    /// Model's caution text, when non-empty.
    pub warning: Option<String>,
    /// Follow-up suggestions accompanying the answer, at most three.
    pub next_steps: Vec<NextStep>,
    /// Model post-mortem for an exhausted turn. Best-effort; absent when
    /// the model is unreachable or returns garbage.
    pub diagnosis: Option<OracleDiagnosis>,
}

impl TurnOutput {
    fn bare(progress: TurnProgress) -> Self {
        Self {
            progress,
            explanation: None,
            warning: None,
            next_steps: Vec::new(),
            diagnosis: None,
        }
    }
}

pub struct Session<P, R, S> {
    oracle: Oracle<P>,
    orchestrator: Orchestrator<R, S>,
    /// Pre-rendered system profile markdown, sent with every model call.
    profile_context: String,
    next_steps: Vec<NextStep>,
    recent: VecDeque<String>,
}

impl<P: LlmProvider, R: CommandRunner, S: EventSink> Session<P, R, S> {
    #[must_use]
    pub fn new(oracle: Oracle<P>, orchestrator: Orchestrator<R, S>, profile_context: String) -> Self {
        Self {
            oracle,
            orchestrator,
            profile_context,
            next_steps: Vec::new(),
            recent: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.oracle.provider_name()
    }

    /// Token that cancels the command currently in flight. Stable across
    /// turns, so it can be captured before the turn it interrupts.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.orchestrator.cancellation_token()
    }

    /// The command text suspended on a confirmation, if any.
    #[must_use]
    pub fn awaiting(&self) -> Option<&str> {
        self.orchestrator.awaiting()
    }

    /// Follow-up suggestions from the last answered query.
    #[must_use]
    pub fn next_steps(&self) -> &[NextStep] {
        &self.next_steps
    }

    /// Translate a natural-language request into a command and drive it
    /// through the execution pipeline.
    ///
    /// # Errors
    ///
    /// Fails on model transport/parse errors, on shell spawn failure, or
    /// when the in-flight command is cancelled.
    pub async fn ask(&mut self, query: &str) -> Result<TurnOutput, SessionError> {
        let context = self.build_context();
        let reply = self.oracle.propose(query, &context).await?;

        self.next_steps = reply.next_steps;
        self.next_steps.truncate(NEXT_STEP_CAP);

        let proposal = CommandProposal::new(reply.command, query, reply.explanation.clone());
        let progress = self.orchestrator.submit(proposal).await?;
        let mut output = self.finish(progress).await;
        if !reply.explanation.is_empty() {
            output.explanation = Some(reply.explanation);
        }
        if !reply.warning.is_empty() {
            output.warning = Some(reply.warning);
        }
        output.next_steps = self.next_steps.clone();
        Ok(output)
    }

    /// Resolve the pending confirmation with the user's decision.
    ///
    /// Returns a `Noop` output when nothing is suspended.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Session::ask`], minus the model call.
    pub async fn confirm(&mut self, approved: bool) -> Result<TurnOutput, SessionError> {
        let Some(command) = self.orchestrator.awaiting().map(String::from) else {
            return Ok(TurnOutput::bare(TurnProgress::Noop));
        };
        let progress = self.orchestrator.resume(&command, approved).await?;
        Ok(self.finish(progress).await)
    }

    /// Run one of the follow-up suggestions from the last answer,
    /// numbered from 1.
    ///
    /// # Errors
    ///
    /// Fails when `ordinal` is out of range, plus the usual execution
    /// failure modes.
    pub async fn pick(&mut self, ordinal: usize) -> Result<TurnOutput, SessionError> {
        let available = self.next_steps.len();
        let Some(step) = ordinal.checked_sub(1).and_then(|i| self.next_steps.get(i)) else {
            return Err(SessionError::NoSuchNextStep { ordinal, available });
        };
        let step = step.clone();
        let proposal =
            CommandProposal::new(step.command, step.description.clone(), step.description);
        let progress = self.orchestrator.submit(proposal).await?;
        Ok(self.finish(progress).await)
    }

    /// Run a command exactly as typed, skipping the model. The safety
    /// pipeline still applies.
    ///
    /// # Errors
    ///
    /// Same execution failure modes as [`Session::ask`].
    pub async fn run_verbatim(&mut self, command: &str) -> Result<TurnOutput, SessionError> {
        let progress = self
            .orchestrator
            .submit(CommandProposal::verbatim(command))
            .await?;
        Ok(self.finish(progress).await)
    }

    /// Bookkeeping shared by every entry point: remember what ran, and
    /// fetch a model post-mortem for exhausted turns.
    async fn finish(&mut self, progress: TurnProgress) -> TurnOutput {
        match &progress {
            TurnProgress::Completed(report) => {
                self.remember(&report.result.command);
            }
            TurnProgress::Exhausted(failure) => {
                self.remember(&failure.result.command);
                let context = self.build_context();
                let diagnosis = match self
                    .oracle
                    .diagnose_failure(
                        &failure.result.command,
                        failure.result.exit_code,
                        &failure.result.stderr_lossy(),
                        &context,
                    )
                    .await
                {
                    Ok(diagnosis) => Some(diagnosis),
                    Err(err) => {
                        tracing::warn!(%err, "failure diagnosis unavailable");
                        None
                    }
                };
                let mut output = TurnOutput::bare(progress);
                output.diagnosis = diagnosis;
                return output;
            }
            _ => {}
        }
        TurnOutput::bare(progress)
    }

    fn remember(&mut self, command: &str) {
        self.recent.push_back(command.to_string());
        while self.recent.len() > RECENT_CAP {
            self.recent.pop_front();
        }
    }

    fn build_context(&self) -> String {
        let mut context = self.profile_context.clone();
        context.push_str("\n## Session\n");
        if let Ok(cwd) = std::env::current_dir() {
            let _ = writeln!(context, "- Current directory: {}", cwd.display());
        }
        if self.recent.is_empty() {
            context.push_str("- No commands run yet this session\n");
        } else {
            context.push_str("- Recent commands:\n");
            for command in &self.recent {
                let _ = writeln!(context, "  - `{command}`");
            }
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensei_exec::{
        Diagnoser, ExecConfig, NullSink, RiskClassifier, RiskConfig, ShellRunner, TurnOutcome,
    };
    use sensei_llm::MockProvider;

    fn orchestrator(max_retries: u32) -> Orchestrator<ShellRunner, NullSink> {
        let config = ExecConfig {
            shell: Some("/bin/sh".to_string()),
            timeout_secs: 5,
            ..ExecConfig::default()
        };
        let classifier = RiskClassifier::new(&RiskConfig::default()).unwrap();
        Orchestrator::new(
            classifier,
            ShellRunner::new(&config),
            Diagnoser::new(None),
            NullSink,
            max_retries,
        )
    }

    fn session(replies: Vec<&str>) -> Session<MockProvider, ShellRunner, NullSink> {
        let provider = MockProvider::new(replies.into_iter().map(String::from).collect());
        Session::new(
            Oracle::new(provider),
            orchestrator(0),
            "# System Profile\n- distro: test\n".to_string(),
        )
    }

    #[tokio::test]
    async fn ask_runs_proposed_command() {
        let mut session = session(vec![
            r#"{"command":"echo hello","explanation":"Prints hello.","warning":"","next_steps":[]}"#,
        ]);
        let output = session.ask("say hello").await.unwrap();

        let TurnProgress::Completed(report) = &output.progress else {
            panic!("expected completion, got {:?}", output.progress);
        };
        assert_eq!(report.result.stdout_lossy().trim(), "hello");
        assert_eq!(output.explanation.as_deref(), Some("Prints hello."));
        assert!(output.warning.is_none());
    }

    #[tokio::test]
    async fn ask_surfaces_warning_and_next_steps() {
        let mut session = session(vec![
            r#"{"command":"true","explanation":"","warning":"careful","next_steps":[{"command":"echo 1","description":"one"},{"command":"echo 2","description":"two"}]}"#,
        ]);
        let output = session.ask("do something").await.unwrap();
        assert_eq!(output.warning.as_deref(), Some("careful"));
        assert_eq!(output.next_steps.len(), 2);
        assert_eq!(session.next_steps().len(), 2);
    }

    #[tokio::test]
    async fn risky_proposal_suspends_until_confirmed() {
        let mut session = session(vec![
            r#"{"command":"sudo true","explanation":"","warning":"","next_steps":[]}"#,
        ]);
        let output = session.ask("do the thing").await.unwrap();
        assert!(matches!(
            output.progress,
            TurnProgress::AwaitingConfirmation { .. }
        ));
        assert_eq!(session.awaiting(), Some("sudo true"));

        let output = session.confirm(false).await.unwrap();
        assert!(matches!(output.progress, TurnProgress::Cancelled));
        assert!(session.awaiting().is_none());
    }

    #[tokio::test]
    async fn confirm_without_pending_is_noop() {
        let mut session = session(vec!["{}"]);
        let output = session.confirm(true).await.unwrap();
        assert!(matches!(output.progress, TurnProgress::Noop));
    }

    #[tokio::test]
    async fn blocked_proposal_never_runs() {
        let mut session = session(vec![
            r#"{"command":"rm -rf / --no-preserve-root","explanation":"","warning":"","next_steps":[]}"#,
        ]);
        let output = session.ask("wipe everything").await.unwrap();
        assert!(matches!(output.progress, TurnProgress::Blocked { .. }));
    }

    #[tokio::test]
    async fn exhausted_turn_carries_model_diagnosis() {
        let mut session = session(vec![
            r#"{"command":"false","explanation":"","warning":"","next_steps":[]}"#,
            r#"{"diagnosis":"it always fails","fix_command":"","explanation":""}"#,
        ]);
        let output = session.ask("fail please").await.unwrap();

        let TurnProgress::Exhausted(failure) = &output.progress else {
            panic!("expected exhaustion, got {:?}", output.progress);
        };
        assert_eq!(failure.result.exit_code, 1);
        assert_eq!(
            output.diagnosis.as_ref().map(|d| d.diagnosis.as_str()),
            Some("it always fails")
        );
    }

    #[tokio::test]
    async fn unparseable_diagnosis_is_dropped() {
        let mut session = session(vec![
            r#"{"command":"false","explanation":"","warning":"","next_steps":[]}"#,
            "not json at all",
        ]);
        let output = session.ask("fail please").await.unwrap();
        assert!(matches!(output.progress, TurnProgress::Exhausted(_)));
        assert!(output.diagnosis.is_none());
    }

    #[tokio::test]
    async fn pick_runs_numbered_follow_up() {
        let mut session = session(vec![
            r#"{"command":"true","explanation":"","warning":"","next_steps":[{"command":"echo follow","description":"prints"}]}"#,
        ]);
        session.ask("first").await.unwrap();

        let output = session.pick(1).await.unwrap();
        let TurnProgress::Completed(report) = &output.progress else {
            panic!("expected completion, got {:?}", output.progress);
        };
        assert_eq!(report.result.stdout_lossy().trim(), "follow");
    }

    #[tokio::test]
    async fn pick_out_of_range_names_whats_available() {
        let mut session = session(vec!["{}"]);
        let err = session.pick(2).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NoSuchNextStep {
                ordinal: 2,
                available: 0
            }
        ));
    }

    #[tokio::test]
    async fn run_verbatim_skips_the_model() {
        let mut session = session(vec!["{}"]);
        let output = session.run_verbatim("echo direct").await.unwrap();
        let TurnProgress::Completed(report) = &output.progress else {
            panic!("expected completion, got {:?}", output.progress);
        };
        assert_eq!(report.result.stdout_lossy().trim(), "direct");
    }

    #[tokio::test]
    async fn context_includes_recent_commands() {
        let mut session = session(vec!["{}"]);
        session.run_verbatim("echo one").await.unwrap();

        let context = session.build_context();
        assert!(context.contains("# System Profile"));
        assert!(context.contains("Current directory"));
        assert!(context.contains("`echo one`"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_data_not_error() {
        let mut session = session(vec![
            r#"{"command":"false","explanation":"","warning":"","next_steps":[]}"#,
            r#"{"diagnosis":"x","fix_command":"","explanation":""}"#,
        ]);
        // ask() returns Ok even though the command failed.
        let output = session.ask("fail").await.unwrap();
        let TurnProgress::Exhausted(failure) = output.progress else {
            panic!("expected exhaustion");
        };
        assert_eq!(failure.attempts, 1);
    }

    #[test]
    fn turn_outcome_is_shared_vocabulary() {
        // The learning crate deserializes outcomes this crate's pipeline
        // produced; pin the wire form.
        let json = serde_json::to_string(&TurnOutcome::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }
}
