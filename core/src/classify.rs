//! Risk scoring seam: the [`RiskModel`] backend trait, the [`RiskClassifier`]
//! adapter the engine talks to, and two bundled backends.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ClassifyError;
use crate::features::truthy;
use crate::model::FeatureMap;

/// Raw output of a scoring backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub score: f64,
    pub category: Option<String>,
}

impl Prediction {
    pub fn benign(score: f64) -> Self {
        Prediction { score, category: None }
    }

    pub fn threat(score: f64, category: impl Into<String>) -> Self {
        Prediction { score, category: Some(category.into()) }
    }
}

#[async_trait]
pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;

    /// Score one item. May be stochastic; callers must not cache.
    async fn predict(&self, features: &FeatureMap) -> Result<Prediction, ClassifyError>;
}

/// Normalizes whatever the backend returns into a score in `[0, 100]` and an
/// optional, non-blank category.
#[derive(Clone)]
pub struct RiskClassifier {
    model: Arc<dyn RiskModel>,
}

impl RiskClassifier {
    pub fn new(model: Arc<dyn RiskModel>) -> Self {
        RiskClassifier { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn classify(&self, features: &FeatureMap) -> Result<Prediction, ClassifyError> {
        let raw = self.model.predict(features).await?;
        let score = if raw.score.is_nan() { 0.0 } else { raw.score.clamp(0.0, 100.0) };
        let category = raw.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        Ok(Prediction { score, category })
    }
}

pub const THREAT_TYPES: &[&str] = &[
    "Ransomware",
    "Trojan",
    "Backdoor",
    "Spyware",
    "Worm",
    "Rootkit",
    "Adware",
    "Keylogger",
    "Botnet",
    "Cryptominer",
    "Zero-day Exploit",
    "Malicious Script",
    "Suspicious Network Activity",
    "Unusual Port Usage",
    "Privilege Escalation Attempt",
];

/// Demo backend: ignores features and draws a uniform score.
pub struct RandomModel {
    rng: Mutex<StdRng>,
}

impl RandomModel {
    pub fn new() -> Self {
        RandomModel { rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn seeded(seed: u64) -> Self {
        RandomModel { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    fn draw(&self) -> Prediction {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let score = rng.gen_range(0.0..1.0) * 100.0;
        let tier: &[&str] = if score < 30.0 {
            if score <= 10.0 {
                return Prediction::benign(score);
            }
            &THREAT_TYPES[6..]
        } else if score < 70.0 {
            &THREAT_TYPES[3..7]
        } else {
            &THREAT_TYPES[..3]
        };
        match tier.choose(&mut *rng) {
            Some(c) => Prediction::threat(score, *c),
            None => Prediction::benign(score),
        }
    }
}

impl Default for RandomModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RiskModel for RandomModel {
    fn name(&self) -> &str {
        "random"
    }

    async fn predict(&self, _features: &FeatureMap) -> Result<Prediction, ClassifyError> {
        Ok(self.draw())
    }
}

/// Deterministic weighting of the host feature schema. Dataset rows using the
/// same column names score the same way; rows without them score 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicModel;

const BENIGN_BELOW: f64 = 10.0;

impl HeuristicModel {
    pub fn score(features: &FeatureMap) -> Prediction {
        let open = crate::features::number(features.get("total_open_ports"))
            .unwrap_or(0.0)
            .max(0.0);
        let mut signals: Vec<(f64, &str)> =
            vec![(open.min(10.0) * 2.0, "Suspicious Network Activity")];
        let weights: &[(&str, f64, &str)] = &[
            ("has_telnet", 30.0, "Backdoor"),
            ("has_unusual_ports", 20.0, "Unusual Port Usage"),
            ("has_ftp", 15.0, "Suspicious Network Activity"),
            ("has_smb", 15.0, "Privilege Escalation Attempt"),
            ("has_rdp", 15.0, "Privilege Escalation Attempt"),
            ("has_ssh", 5.0, "Suspicious Network Activity"),
            ("has_http", 3.0, "Suspicious Network Activity"),
        ];
        for &(name, weight, category) in weights {
            if truthy(features.get(name)) {
                signals.push((weight, category));
            }
        }
        let score: f64 = signals.iter().map(|(w, _)| w).sum::<f64>().min(100.0);
        if score < BENIGN_BELOW {
            return Prediction::benign(score);
        }
        let dominant = signals.iter().fold((0.0, "Suspicious Network Activity"), |best, &(w, c)| {
            if w > best.0 {
                (w, c)
            } else {
                best
            }
        });
        Prediction::threat(score, dominant.1)
    }
}

#[async_trait]
impl RiskModel for HeuristicModel {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn predict(&self, features: &FeatureMap) -> Result<Prediction, ClassifyError> {
        Ok(Self::score(features))
    }
}
