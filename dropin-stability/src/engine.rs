use std::sync::Arc;

use dropin_core::{ModuleHost, ServiceCensus, ServiceRegistry};
use serde::Serialize;
use tracing::{info, warn};

use crate::checker::{CheckerResult, PendingWorkReporter, StabilityChecker};
use crate::checkers::{ModuleStateChecker, PendingWorkChecker, ServiceChurnChecker};
use crate::timing::StabilityTiming;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckerOutcome {
    pub name: String,
    pub priority: i32,
    pub result: CheckerResult,
}

/// Per-checker results of one evaluation, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StabilityReport {
    pub stable: bool,
    pub checkers: Vec<CheckerOutcome>,
}

impl StabilityReport {
    /// The checker that stopped the evaluation, if any.
    pub fn first_unstable(&self) -> Option<&CheckerOutcome> {
        self.checkers
            .iter()
            .find(|outcome| matches!(outcome.result, CheckerResult::Unstable { .. }))
    }
}

/// Runs the baseline checkers plus every checker registered in `checkers`.
pub struct StabilityEngine {
    baseline: Vec<Arc<dyn StabilityChecker>>,
    checkers: ServiceRegistry<dyn StabilityChecker>,
    timing: StabilityTiming,
}

impl StabilityEngine {
    pub fn new(
        host: Arc<dyn ModuleHost>,
        census: ServiceCensus,
        reporters: ServiceRegistry<dyn PendingWorkReporter>,
        checkers: ServiceRegistry<dyn StabilityChecker>,
        timing: StabilityTiming,
    ) -> Self {
        let baseline: Vec<Arc<dyn StabilityChecker>> = vec![
            Arc::new(ModuleStateChecker::new(host)),
            Arc::new(ServiceChurnChecker::new(census)),
            Arc::new(PendingWorkChecker::new(reporters)),
        ];
        Self {
            baseline,
            checkers,
            timing,
        }
    }

    pub fn timing(&self) -> StabilityTiming {
        self.timing
    }

    /// Baseline and registered checkers by ascending priority. Equal
    /// priorities keep baseline first, then registration order.
    pub fn ordered(&self) -> Vec<Arc<dyn StabilityChecker>> {
        let mut all = self.baseline.clone();
        all.extend(self.checkers.snapshot());
        all.sort_by_key(|checker| checker.priority());
        all
    }

    /// Evaluate every checker in order, skipping the rest after the first
    /// unstable one.
    pub fn report_with(&self, timing: &StabilityTiming) -> StabilityReport {
        let mut stable = true;
        let checkers = self
            .ordered()
            .into_iter()
            .map(|checker| {
                let result = if stable {
                    let result = checker.check(timing);
                    if let CheckerResult::Unstable { reason } = &result {
                        warn!(checker = checker.name(), %reason, "system not stable");
                        stable = false;
                    }
                    result
                } else {
                    CheckerResult::NotRun
                };
                CheckerOutcome {
                    name: checker.name().to_string(),
                    priority: checker.priority(),
                    result,
                }
            })
            .collect();
        StabilityReport { stable, checkers }
    }

    /// Report using the configured timing.
    pub fn report(&self) -> StabilityReport {
        self.report_with(&self.timing)
    }

    /// Quick probe: 3 ms grace, 3 attempts.
    pub fn is_stable(&self) -> bool {
        self.report_with(&self.timing.quick()).stable
    }

    /// Block until stable or until the configured budget runs out.
    pub fn wait_for_stability(&self) -> bool {
        let report = self.report();
        if report.stable {
            info!("system stable");
        }
        report.stable
    }
}
