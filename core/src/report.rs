//! Aggregate view of a job's results, bucketed with the same bands as recommendations.

use serde::Serialize;

use crate::model::ItemResult;
use crate::recommend::RiskBand;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskSummary {
    pub total: usize,
    pub records: usize,
    pub hosts: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Results carrying a threat category (sentinels excluded).
    pub findings: usize,
    /// Sentinel results for items that could not be processed.
    pub failed_items: usize,
}

impl RiskSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ItemResult>) -> Self {
        let mut s = RiskSummary::default();
        for r in results {
            s.total += 1;
            match r.detail.kind() {
                "record" => s.records += 1,
                _ => s.hosts += 1,
            }
            if r.is_sentinel() {
                s.failed_items += 1;
                continue;
            }
            if r.is_finding() {
                s.findings += 1;
            }
            match RiskBand::from_score(r.risk_score) {
                RiskBand::High => s.high += 1,
                RiskBand::Medium => s.medium += 1,
                RiskBand::Low => s.low += 1,
            }
        }
        s
    }
}
