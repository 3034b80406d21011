//! Confirmation gate for commands that need explicit approval.
//!
//! The gate never prompts. It records the exact command text awaiting a
//! decision and lets the caller resolve it later, so a UI can suspend a
//! turn, ask the user however it likes, and resume.

/// Outcome of resolving a pending confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateResolution {
    /// The pending command may run exactly once.
    Approved,
    /// The pending command is dropped.
    Declined,
    /// The resolution did not match what was pending (different text, or
    /// nothing pending). The original request stays unresolved.
    Stale,
}

/// Holds at most one command awaiting approval.
///
/// Approval is single-use and bound to exact command text: a retry or an
/// edited command re-enters classification and, if still risky, arms the
/// gate again.
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Option<String>,
}

impl ConfirmationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the gate for `command`, replacing any previous pending entry.
    pub fn request(&mut self, command: &str) {
        self.pending = Some(command.to_string());
    }

    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Drop any pending request without resolving it.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// Resolve the pending request for `command`.
    ///
    /// The text must match the pending command exactly; otherwise the
    /// decision is [`GateResolution::Stale`] and the pending entry is kept.
    pub fn resolve(&mut self, command: &str, approved: bool) -> GateResolution {
        match self.pending.as_deref() {
            Some(pending) if pending == command => {
                self.pending = None;
                if approved {
                    GateResolution::Approved
                } else {
                    GateResolution::Declined
                }
            }
            _ => GateResolution::Stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_is_single_use() {
        let mut gate = ConfirmationGate::new();
        gate.request("sudo apt update");
        assert_eq!(gate.resolve("sudo apt update", true), GateResolution::Approved);
        // Second resolution finds nothing pending.
        assert_eq!(gate.resolve("sudo apt update", true), GateResolution::Stale);
    }

    #[test]
    fn decline_clears_pending() {
        let mut gate = ConfirmationGate::new();
        gate.request("rm -rf ./build");
        assert_eq!(gate.resolve("rm -rf ./build", false), GateResolution::Declined);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn mismatched_text_is_stale_and_keeps_pending() {
        let mut gate = ConfirmationGate::new();
        gate.request("sudo systemctl stop nginx");
        assert_eq!(
            gate.resolve("sudo systemctl stop apache2", true),
            GateResolution::Stale
        );
        assert_eq!(gate.pending(), Some("sudo systemctl stop nginx"));
    }

    #[test]
    fn resolve_without_request_is_stale() {
        let mut gate = ConfirmationGate::new();
        assert_eq!(gate.resolve("ls", true), GateResolution::Stale);
    }

    #[test]
    fn new_request_replaces_old() {
        let mut gate = ConfirmationGate::new();
        gate.request("sudo cmd-a");
        gate.request("sudo cmd-b");
        assert_eq!(gate.resolve("sudo cmd-a", true), GateResolution::Stale);
        assert_eq!(gate.resolve("sudo cmd-b", true), GateResolution::Approved);
    }
}
