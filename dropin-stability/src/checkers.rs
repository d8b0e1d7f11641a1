//! Checkers every engine carries.

use std::sync::Arc;

use dropin_core::{ModuleHost, ServiceCensus, ServiceRegistry};
use tracing::debug;

use crate::checker::{CheckerResult, PendingWorkReporter, StabilityChecker};
use crate::timing::StabilityTiming;

/// Every module Active, every attachment Resolved.
pub struct ModuleStateChecker {
    host: Arc<dyn ModuleHost>,
}

impl ModuleStateChecker {
    pub const PRIORITY: i32 = 0;

    pub fn new(host: Arc<dyn ModuleHost>) -> Self {
        Self { host }
    }

    fn unsettled(&self) -> Vec<String> {
        self.host
            .modules()
            .into_iter()
            .filter(|module| !module.is_settled())
            .map(|module| format!("{} ({})", module.identity, module.state))
            .collect()
    }
}

impl StabilityChecker for ModuleStateChecker {
    fn name(&self) -> &str {
        "module-state"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn check(&self, timing: &StabilityTiming) -> CheckerResult {
        let mut last = Vec::new();
        let settled = timing.wait_until(|| {
            last = self.unsettled();
            last.is_empty()
        });
        match settled {
            Some(_) => CheckerResult::Stable,
            None => CheckerResult::unstable(format!("modules not settled: {}", last.join(", "))),
        }
    }
}

/// The number of registered services holds still over one grace period.
pub struct ServiceChurnChecker {
    census: ServiceCensus,
}

impl ServiceChurnChecker {
    pub const PRIORITY: i32 = 1;

    pub fn new(census: ServiceCensus) -> Self {
        Self { census }
    }
}

impl StabilityChecker for ServiceChurnChecker {
    fn name(&self) -> &str {
        "service-churn"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn check(&self, timing: &StabilityTiming) -> CheckerResult {
        let mut counts = (0, 0);
        let steady = timing.wait_until(|| {
            let before = self.census.count();
            timing.sleep();
            let after = self.census.count();
            debug!(before, after, "service census");
            counts = (before, after);
            before == after
        });
        match steady {
            Some(_) => CheckerResult::Stable,
            None => CheckerResult::unstable(format!(
                "service count still changing ({} -> {})",
                counts.0, counts.1
            )),
        }
    }
}

/// Every registered [`PendingWorkReporter`] is idle.
pub struct PendingWorkChecker {
    reporters: ServiceRegistry<dyn PendingWorkReporter>,
}

impl PendingWorkChecker {
    pub const PRIORITY: i32 = 2;

    pub fn new(reporters: ServiceRegistry<dyn PendingWorkReporter>) -> Self {
        Self { reporters }
    }

    fn busy(&self) -> Vec<String> {
        self.reporters
            .snapshot()
            .iter()
            .filter_map(|reporter| {
                let (current, waiting) = (reporter.current(), reporter.waiting());
                (current != 0 || waiting != 0)
                    .then(|| format!("{} ({current} running, {waiting} waiting)", reporter.name()))
            })
            .collect()
    }
}

impl StabilityChecker for PendingWorkChecker {
    fn name(&self) -> &str {
        "pending-work"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    fn check(&self, timing: &StabilityTiming) -> CheckerResult {
        let mut last = Vec::new();
        let idle = timing.wait_until(|| {
            last = self.busy();
            last.is_empty()
        });
        match idle {
            Some(_) => CheckerResult::Stable,
            None => CheckerResult::unstable(format!("work still pending: {}", last.join(", "))),
        }
    }
}
