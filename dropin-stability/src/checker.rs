use std::fmt;

use serde::Serialize;

use crate::timing::StabilityTiming;

/// Outcome of one checker in one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckerResult {
    Stable,
    Unstable { reason: String },
    /// An earlier checker was unstable, so this one was skipped.
    NotRun,
}

impl CheckerResult {
    pub fn unstable(reason: impl Into<String>) -> Self {
        Self::Unstable {
            reason: reason.into(),
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

impl fmt::Display for CheckerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => f.write_str("stable"),
            Self::Unstable { reason } => write!(f, "unstable: {reason}"),
            Self::NotRun => f.write_str("not run"),
        }
    }
}

/// One aspect of system quiescence.
///
/// Lower priorities run first. `check` may block the caller for up to
/// `timing.attempts` grace periods.
pub trait StabilityChecker: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    fn check(&self, timing: &StabilityTiming) -> CheckerResult;
}

/// A component with asynchronous work in progress.
pub trait PendingWorkReporter: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Jobs being processed right now.
    fn current(&self) -> usize;

    /// Jobs queued and not started.
    fn waiting(&self) -> usize;
}
