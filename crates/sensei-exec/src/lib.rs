//! Safety-gated shell command execution.
//!
//! Pipeline: a [`CommandProposal`] is classified by [`RiskClassifier`],
//! optionally held by [`ConfirmationGate`], run by a [`CommandRunner`],
//! and on failure diagnosed by [`Diagnoser`] for a bounded retry. The
//! [`Orchestrator`] ties the stages together and reports terminal states
//! to an [`EventSink`].

mod audit;
mod config;
mod diagnose;
mod error;
mod gate;
mod orchestrator;
mod proposal;
mod risk;
mod runner;

pub use audit::{AuditEntry, AuditLogger, AuditResult};
pub use config::{AuditConfig, ExecConfig, RiskConfig};
pub use diagnose::{Diagnoser, FailureCause, FailureReport};
pub use error::ExecError;
pub use gate::{ConfirmationGate, GateResolution};
pub use orchestrator::{
    EventSink, NullSink, Orchestrator, TurnEvent, TurnFailure, TurnOutcome, TurnProgress,
    TurnReport,
};
pub use proposal::CommandProposal;
pub use risk::{Classification, RiskClassifier, RiskTier};
pub use runner::{CommandRunner, ExecutionResult, KILLED_EXIT_CODE, ShellRunner};
