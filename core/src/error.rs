//! Typed errors crossing the collaborator seams.

use thiserror::Error;

use crate::model::{JobId, JobStatus};

/// Probing one address failed; the orchestrator turns this into a sentinel result.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("failed to resolve {0}")]
    Unresolvable(String),
    #[error("probe timed out after {0} ms")]
    Timeout(u64),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("risk model unavailable: {0}")]
    Unavailable(String),
    #[error("risk model rejected features: {0}")]
    Rejected(String),
}

/// Loading a dataset failed. Job-fatal, except when it describes a single row.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Unsupported file format. Only CSV and JSON are supported: {0}")]
    Unsupported(String),
    #[error("malformed dataset: {0}")]
    Malformed(String),
    #[error("dataset io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition { job_id: JobId, from: JobStatus, to: JobStatus },
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("storage backend: {0}")]
    Backend(String),
}
