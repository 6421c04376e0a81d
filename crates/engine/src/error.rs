use riskscan_core::{DatasetError, JobId, JobStatus, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("job {job_id} is {status}, expected pending")]
    NotPending { job_id: JobId, status: JobStatus },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("scan task ended abnormally: {0}")]
    Join(String),
}
