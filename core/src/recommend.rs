//! Risk bands and the action text attached to every result.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MEDIUM_THRESHOLD: f64 = 30.0;
pub const HIGH_THRESHOLD: f64 = 70.0;

/// Score band; shared by recommendations and reports so the cut points never drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score < MEDIUM_THRESHOLD {
            RiskBand::Low
        } else if score < HIGH_THRESHOLD {
            RiskBand::Medium
        } else {
            RiskBand::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn recommend(category: Option<&str>, score: f64) -> String {
    let Some(category) = category else {
        return "No action required.".to_string();
    };
    match RiskBand::from_score(score) {
        RiskBand::Low => format!("Low risk {category} detected. Monitor for changes in behavior."),
        RiskBand::Medium => {
            format!("Medium risk {category} detected. Investigate further and consider isolation.")
        }
        RiskBand::High => format!(
            "High risk {category} detected. \
             Immediate action required. Isolate and remove the threat."
        ),
    }
}
