//! Per-turn execution orchestrator.
//!
//! Owns the full lifecycle of one command turn: classify, gate, run,
//! diagnose, retry. Confirmation is modeled as a suspended state, not a
//! prompt: [`Orchestrator::submit`] returns
//! [`TurnProgress::AwaitingConfirmation`] and the caller resumes with
//! the user's decision whenever it arrives.
//!
//! Every retry candidate re-enters classification. A blocked command
//! never reaches the runner, approved or not.

use tokio_util::sync::CancellationToken;

use crate::audit::{AuditEntry, AuditLogger, AuditResult, unix_timestamp};
use crate::diagnose::{Diagnoser, FailureReport};
use crate::error::ExecError;
use crate::gate::{ConfirmationGate, GateResolution};
use crate::proposal::CommandProposal;
use crate::risk::{RiskClassifier, RiskTier};
use crate::runner::{CommandRunner, ExecutionResult};

/// One record per finished turn, consumed by progress tracking.
#[derive(Clone, Debug, serde::Serialize)]
pub struct TurnEvent {
    pub command: String,
    pub tier: RiskTier,
    pub outcome: TurnOutcome,
}

/// Terminal states that produce a [`TurnEvent`].
///
/// Declined confirmations and cancellations are deliberate user choices,
/// not outcomes, and emit nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Blocked,
    Succeeded,
    Exhausted,
}

/// Receives exactly one event per terminal turn state.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &TurnEvent) -> impl Future<Output = ()> + Send;
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    async fn record(&self, _event: &TurnEvent) {}
}

impl<T: EventSink> EventSink for std::sync::Arc<T> {
    async fn record(&self, event: &TurnEvent) {
        (**self).record(event).await;
    }
}

/// A successfully finished turn.
#[derive(Clone, Debug)]
pub struct TurnReport {
    pub result: ExecutionResult,
    /// Number of runner invocations, including retries.
    pub attempts: u32,
    /// True when success came from a retry rather than the first attempt.
    pub recovered: bool,
}

/// A turn that ran out of retries (or had no fix to try).
#[derive(Clone, Debug)]
pub struct TurnFailure {
    pub result: ExecutionResult,
    pub report: FailureReport,
    pub attempts: u32,
}

/// What a turn looks like from the caller's side after `submit` or
/// `resume` returns.
#[derive(Debug)]
pub enum TurnProgress {
    /// Empty command; nothing happened.
    Noop,
    /// Refused outright. There is no way to run this command.
    Blocked { pattern: String },
    /// Suspended until the caller resumes with a decision.
    AwaitingConfirmation {
        proposal: CommandProposal,
        reasons: Vec<String>,
    },
    /// The user declined a confirmation; the turn is over.
    Cancelled,
    Completed(TurnReport),
    Exhausted(TurnFailure),
}

struct PendingTurn {
    proposal: CommandProposal,
    attempts: u32,
}

/// Drives proposals through classify -> gate -> run -> diagnose -> retry.
pub struct Orchestrator<R, S> {
    classifier: RiskClassifier,
    gate: ConfirmationGate,
    runner: R,
    diagnoser: Diagnoser,
    sink: S,
    audit_logger: Option<AuditLogger>,
    max_retries: u32,
    cancel: CancellationToken,
    pending: Option<PendingTurn>,
}

impl<R: CommandRunner, S: EventSink> Orchestrator<R, S> {
    #[must_use]
    pub fn new(
        classifier: RiskClassifier,
        runner: R,
        diagnoser: Diagnoser,
        sink: S,
        max_retries: u32,
    ) -> Self {
        Self {
            classifier,
            gate: ConfirmationGate::new(),
            runner,
            diagnoser,
            sink,
            audit_logger: None,
            max_retries,
            cancel: CancellationToken::new(),
            pending: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Token controlling the in-flight command. Cancelling it kills the
    /// running command's whole process group.
    ///
    /// The token outlives individual turns and is replaced only after a
    /// cancellation, so it may be captured before `submit` and used to
    /// interrupt the turn it starts.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The command text awaiting confirmation, if any.
    #[must_use]
    pub fn awaiting(&self) -> Option<&str> {
        self.gate.pending()
    }

    /// Start a new turn. Any previously suspended turn is abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::LaunchFailure`] if the shell cannot be
    /// spawned, or [`ExecError::Cancelled`] if the token fired mid-run.
    pub async fn submit(&mut self, proposal: CommandProposal) -> Result<TurnProgress, ExecError> {
        self.pending = None;
        self.gate.clear();
        if proposal.is_empty() {
            return Ok(TurnProgress::Noop);
        }
        self.drive(proposal, 0, false).await
    }

    /// Resume a suspended turn with the user's decision on `command`.
    ///
    /// The text must match the suspended command exactly; otherwise the
    /// turn stays suspended and `AwaitingConfirmation` is returned again.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Orchestrator::submit`].
    pub async fn resume(
        &mut self,
        command: &str,
        approved: bool,
    ) -> Result<TurnProgress, ExecError> {
        let Some(pending) = self.pending.take() else {
            return Ok(TurnProgress::Noop);
        };
        match self.gate.resolve(command, approved) {
            GateResolution::Stale => {
                let reasons = self.classifier.classify(&pending.proposal.text).matched;
                let progress = TurnProgress::AwaitingConfirmation {
                    proposal: pending.proposal.clone(),
                    reasons,
                };
                self.pending = Some(pending);
                Ok(progress)
            }
            GateResolution::Declined => {
                tracing::info!(command, "confirmation declined");
                Ok(TurnProgress::Cancelled)
            }
            GateResolution::Approved => {
                self.drive(pending.proposal, pending.attempts, true).await
            }
        }
    }

    async fn drive(
        &mut self,
        mut proposal: CommandProposal,
        mut attempts: u32,
        mut preapproved: bool,
    ) -> Result<TurnProgress, ExecError> {
        loop {
            let classification = self.classifier.classify(&proposal.text);
            match classification.tier {
                RiskTier::Blocked => {
                    // Approval never overrides a block. Retry candidates
                    // are pre-screened, so this is a direct submission.
                    let pattern = classification.matched.first().cloned().unwrap_or_default();
                    tracing::warn!(command = %proposal.text, %pattern, "command blocked");
                    self.audit(
                        &proposal.text,
                        RiskTier::Blocked,
                        AuditResult::Blocked {
                            reason: pattern.clone(),
                        },
                        0,
                    )
                    .await;
                    self.record(&proposal.text, RiskTier::Blocked, TurnOutcome::Blocked)
                        .await;
                    return Ok(TurnProgress::Blocked { pattern });
                }
                RiskTier::ConfirmRequired if !preapproved => {
                    self.gate.request(&proposal.text);
                    self.pending = Some(PendingTurn {
                        proposal: proposal.clone(),
                        attempts,
                    });
                    return Ok(TurnProgress::AwaitingConfirmation {
                        proposal,
                        reasons: classification.matched,
                    });
                }
                RiskTier::ConfirmRequired | RiskTier::Safe => {}
            }
            // Approval is bound to this exact proposal, once.
            preapproved = false;
            let tier = classification.tier;

            let result = match self.runner.run(&proposal.text, &self.cancel).await {
                Ok(result) => result,
                Err(err) => {
                    if matches!(err, ExecError::Cancelled) {
                        // Cancelled tokens stay cancelled; arm a fresh
                        // one so the next turn can run.
                        self.cancel = CancellationToken::new();
                    } else {
                        self.audit(
                            &proposal.text,
                            tier,
                            AuditResult::Error {
                                message: err.to_string(),
                            },
                            0,
                        )
                        .await;
                    }
                    return Err(err);
                }
            };
            attempts += 1;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = result.duration.as_millis() as u64;
            let audit_result = if result.timed_out {
                AuditResult::Timeout
            } else if result.success() {
                AuditResult::Success
            } else {
                AuditResult::Failed {
                    exit_code: result.exit_code,
                }
            };
            self.audit(&result.command, tier, audit_result, duration_ms)
                .await;

            if result.success() {
                self.record(&result.command, tier, TurnOutcome::Succeeded)
                    .await;
                return Ok(TurnProgress::Completed(TurnReport {
                    recovered: attempts > 1,
                    result,
                    attempts,
                }));
            }

            let report = self.diagnoser.diagnose(&result);
            tracing::debug!(
                command = %result.command,
                cause = %report.cause,
                exit_code = result.exit_code,
                "command failed"
            );

            if attempts <= self.max_retries
                && let Some(fix) = report.suggested_fix.clone()
                && self.classifier.classify(&fix.text).tier != RiskTier::Blocked
            {
                tracing::info!(fix = %fix.text, attempt = attempts + 1, "retrying with suggested fix");
                proposal = fix;
                continue;
            }

            self.record(&result.command, tier, TurnOutcome::Exhausted)
                .await;
            return Ok(TurnProgress::Exhausted(TurnFailure {
                result,
                report,
                attempts,
            }));
        }
    }

    async fn record(&self, command: &str, tier: RiskTier, outcome: TurnOutcome) {
        self.sink
            .record(&TurnEvent {
                command: command.to_string(),
                tier,
                outcome,
            })
            .await;
    }

    async fn audit(&self, command: &str, tier: RiskTier, result: AuditResult, duration_ms: u64) {
        if let Some(ref logger) = self.audit_logger {
            let entry = AuditEntry {
                timestamp: unix_timestamp(),
                command: command.into(),
                tier,
                result,
                duration_ms,
            };
            logger.log(&entry).await;
        }
    }
}
