//! Job, result and progress types shared by the engine, the store and the CLI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

pub type JobId = Uuid;
pub type ResultId = Uuid;

/// One already-parsed dataset row.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Flat attribute set handed to risk scoring.
pub type FeatureMap = BTreeMap<String, serde_json::Value>;

/// Discovered open ports keyed by port number.
pub type OpenPorts = BTreeMap<u16, PortService>;

/// Category recorded on sentinel results.
pub const SCAN_FAILED: &str = "Scan failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal lifecycle edges. `Running -> Running` is a progress update.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(StoreError::Corrupt(format!("unknown job status: {other}"))),
        }
    }
}

/// Handle to an external record source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub locator: String,
    pub name: Option<String>,
}

impl DatasetRef {
    /// Reference a dataset file; the display name is the file name component.
    pub fn path(path: impl AsRef<std::path::Path>) -> Self {
        let path = path.as_ref();
        DatasetRef {
            locator: path.to_string_lossy().into_owned(),
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        }
    }
}

/// A scan request before it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub targets: Vec<String>,
    pub dataset: Option<DatasetRef>,
}

impl NewJob {
    /// Build a request, trimming targets and dropping blanks and repeats (first occurrence wins).
    pub fn new<I, S>(targets: I, dataset: Option<DatasetRef>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let targets = targets
            .into_iter()
            .map(|t| t.into().trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        NewJob { targets, dataset }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub targets: Vec<String>,
    pub dataset: Option<DatasetRef>,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub created_ms: i64,
    pub updated_ms: i64,
}

/// Service metadata for one open port, as reported by a prober.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortService {
    pub transport: String,
    pub state: String,
    pub name: String,
    pub product: Option<String>,
    pub version: Option<String>,
}

impl PortService {
    pub fn open_tcp(name: impl Into<String>) -> Self {
        PortService {
            transport: "tcp".into(),
            state: "open".into(),
            name: name.into(),
            product: None,
            version: None,
        }
    }
}

/// Outcome of probing a single address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub address: String,
    pub ports: OpenPorts,
}

/// Variant payload of an [`ItemResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultDetail {
    Record { label: String },
    Host { address: String, open_ports: OpenPorts },
}

impl ResultDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            ResultDetail::Record { .. } => "record",
            ResultDetail::Host { .. } => "host",
        }
    }

    /// Row label for records, address for hosts.
    pub fn label(&self) -> &str {
        match self {
            ResultDetail::Record { label } => label,
            ResultDetail::Host { address, .. } => address,
        }
    }
}

/// One classified unit. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    pub id: ResultId,
    pub job_id: JobId,
    pub risk_score: f64,
    pub category: Option<String>,
    pub recommendation: String,
    pub created_ms: i64,
    #[serde(flatten)]
    pub detail: ResultDetail,
}

impl ItemResult {
    pub fn new(
        job_id: JobId,
        detail: ResultDetail,
        risk_score: f64,
        category: Option<String>,
        recommendation: String,
    ) -> Self {
        ItemResult {
            id: Uuid::now_v7(),
            job_id,
            risk_score,
            category,
            recommendation,
            created_ms: crate::now_ms(),
            detail,
        }
    }

    /// Placeholder for an item whose processing failed.
    pub fn sentinel(job_id: JobId, detail: ResultDetail, diagnostic: String) -> Self {
        ItemResult::new(job_id, detail, 0.0, Some(SCAN_FAILED.to_string()), diagnostic)
    }

    pub fn is_sentinel(&self) -> bool {
        self.category.as_deref() == Some(SCAN_FAILED)
    }

    /// A real finding: categorized and not a sentinel.
    pub fn is_finding(&self) -> bool {
        self.category.is_some() && !self.is_sentinel()
    }
}

/// Ephemeral status update for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub progress: u8,
    pub status: JobStatus,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, progress: u8, status: JobStatus, message: impl Into<String>) -> Self {
        ProgressEvent { job_id, progress, status, message: message.into() }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
