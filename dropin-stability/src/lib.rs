//! Quiescence detection: prioritized checkers that each wait a bounded number
//! of grace periods for one aspect of the system to settle.

pub mod checker;
pub mod checkers;
pub mod engine;
pub mod timing;

pub use checker::{CheckerResult, PendingWorkReporter, StabilityChecker};
pub use checkers::{ModuleStateChecker, PendingWorkChecker, ServiceChurnChecker};
pub use engine::{CheckerOutcome, StabilityEngine, StabilityReport};
pub use timing::StabilityTiming;
