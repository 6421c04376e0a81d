use crate::open::backend;
use crate::query::load_job;
use crate::Db;
use riskscan_core::store::next_state;
use riskscan_core::{
    now_ms, ItemResult, Job, JobId, JobStatus, NewJob, ResultDetail, ResultId, StoreError,
};
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

impl Db {
    pub fn insert_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let now = now_ms();
        let job = Job {
            id: Uuid::now_v7(),
            targets: new.targets,
            dataset: new.dataset,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            created_ms: now,
            updated_ms: now,
        };
        let targets_json =
            serde_json::to_string(&job.targets).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.lock()
            .execute(
                "INSERT INTO jobs(job_id,targets_json,dataset_locator,dataset_name,
                                  status,progress,error,created_ms,updated_ms)
                 VALUES (?,?,?,?,?,?,?,?,?)",
                params![
                    job.id.to_string(),
                    targets_json,
                    job.dataset.as_ref().map(|d| d.locator.as_str()),
                    job.dataset.as_ref().and_then(|d| d.name.as_deref()),
                    job.status.as_str(),
                    job.progress as i64,
                    job.error,
                    job.created_ms,
                    job.updated_ms
                ],
            )
            .map_err(backend)?;
        debug!(job_id = %job.id, targets = job.targets.len(), "job created");
        Ok(job)
    }

    /// Validate the transition against the stored row and write it in one transaction.
    pub fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> Result<Job, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(backend)?;
        let current = load_job(&tx, job_id)?.ok_or(StoreError::JobNotFound(job_id))?;
        let next = next_state(&current, status, progress, error, now_ms())?;
        tx.execute(
            "UPDATE jobs SET status=?, progress=?, error=?, updated_ms=? WHERE job_id=?",
            params![
                next.status.as_str(),
                next.progress as i64,
                next.error,
                next.updated_ms,
                job_id.to_string()
            ],
        )
        .map_err(backend)?;
        tx.commit().map_err(backend)?;
        Ok(next)
    }

    pub fn insert_result(&self, result: &ItemResult) -> Result<ResultId, StoreError> {
        let open_ports_json = match &result.detail {
            ResultDetail::Host { open_ports, .. } => Some(
                serde_json::to_string(open_ports).map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            ResultDetail::Record { .. } => None,
        };
        let changed = self
            .lock()
            .execute(
                "INSERT INTO results(result_id,job_id,kind,label,risk_score,category,recommendation,
                                     open_ports_json,created_ms)
                 SELECT ?,?,?,?,?,?,?,?,? WHERE EXISTS (SELECT 1 FROM jobs WHERE job_id=?)",
                params![
                    result.id.to_string(),
                    result.job_id.to_string(),
                    result.detail.kind(),
                    result.detail.label(),
                    result.risk_score,
                    result.category,
                    result.recommendation,
                    open_ports_json,
                    result.created_ms,
                    result.job_id.to_string()
                ],
            )
            .map_err(backend)?;
        if changed == 0 {
            return Err(StoreError::JobNotFound(result.job_id));
        }
        Ok(result.id)
    }
}
