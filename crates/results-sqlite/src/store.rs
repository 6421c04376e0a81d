use crate::Db;
use async_trait::async_trait;
use riskscan_core::{ItemResult, Job, JobId, JobStatus, NewJob, ResultId, ScanStore, StoreError};

// Statements are short and run under the connection mutex; they are not
// moved to a blocking pool.
#[async_trait]
impl ScanStore for Db {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        self.insert_job(job)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        self.job(job_id)
    }

    async fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> Result<Job, StoreError> {
        self.set_status(job_id, status, progress, error)
    }

    async fn create_result(&self, result: &ItemResult) -> Result<ResultId, StoreError> {
        self.insert_result(result)
    }

    async fn results_for_job(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        self.results(job_id)
    }
}
