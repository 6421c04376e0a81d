//! Persistence seam for jobs and their results.
//!
//! Backends own storage; the lifecycle rules live here in [`next_state`] so
//! every backend applies the same lifecycle rules.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{ItemResult, Job, JobId, JobStatus, NewJob, ResultId};

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Persist a new `pending` job.
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Apply a status/progress update atomically, returning the stored state.
    async fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> Result<Job, StoreError>;

    /// Append one result. Results are never updated afterwards.
    async fn create_result(&self, result: &ItemResult) -> Result<ResultId, StoreError>;

    /// Results of a job in insertion order.
    async fn results_for_job(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError>;
}

/// Compute the state a job moves to under an update, or reject the update.
///
/// - entering `running` resets progress to 0;
/// - progress never decreases while `running`;
/// - `completed` forces progress to 100;
/// - `failed` keeps the progress reached and records the error.
pub fn next_state(
    job: &Job,
    status: JobStatus,
    progress: u8,
    error: Option<&str>,
    now_ms: i64,
) -> Result<Job, StoreError> {
    if !job.status.can_transition_to(status) {
        return Err(StoreError::IllegalTransition { job_id: job.id, from: job.status, to: status });
    }
    let progress = progress.min(100);
    let mut next = job.clone();
    next.progress = match (job.status, status) {
        (JobStatus::Pending, JobStatus::Running) => 0,
        (_, JobStatus::Running) => job.progress.max(progress),
        (_, JobStatus::Completed) => 100,
        _ => job.progress,
    };
    if status == JobStatus::Failed {
        next.error = error.map(str::to_string);
    }
    next.status = status;
    next.updated_ms = now_ms.max(job.updated_ms);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn job(status: JobStatus, progress: u8) -> Job {
        Job {
            id: Uuid::now_v7(),
            targets: vec![],
            dataset: None,
            status,
            progress,
            error: None,
            created_ms: 10,
            updated_ms: 10,
        }
    }

    #[test]
    fn running_progress_never_decreases() {
        let j = next_state(&job(JobStatus::Running, 40), JobStatus::Running, 20, None, 11).unwrap();
        assert_eq!(j.progress, 40);
        let j = next_state(&j, JobStatus::Running, 55, None, 12).unwrap();
        assert_eq!(j.progress, 55);
    }

    #[test]
    fn entering_running_resets_progress() {
        let j = next_state(&job(JobStatus::Pending, 0), JobStatus::Running, 35, None, 11).unwrap();
        assert_eq!(j.status, JobStatus::Running);
        assert_eq!(j.progress, 0);
    }

    #[test]
    fn completion_forces_full_progress() {
        let j =
            next_state(&job(JobStatus::Running, 90), JobStatus::Completed, 0, None, 11).unwrap();
        assert_eq!(j.progress, 100);
    }

    #[test]
    fn failure_records_error_and_freezes() {
        let running = job(JobStatus::Running, 30);
        let j = next_state(&running, JobStatus::Failed, 0, Some("boom"), 11).unwrap();
        assert_eq!(j.progress, 30);
        assert_eq!(j.error.as_deref(), Some("boom"));
        assert!(matches!(
            next_state(&j, JobStatus::Running, 31, None, 12),
            Err(StoreError::IllegalTransition { .. })
        ));
        assert!(next_state(&j, JobStatus::Completed, 100, None, 12).is_err());
    }

    #[test]
    fn updated_time_is_monotonic() {
        let j = next_state(&job(JobStatus::Running, 1), JobStatus::Running, 2, None, 5).unwrap();
        assert_eq!(j.updated_ms, 10);
    }
}
