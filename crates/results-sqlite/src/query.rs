use crate::models::{JobRow, ResultRow, JOB_COLUMNS, RESULT_COLUMNS};
use crate::open::backend;
use crate::Db;
use riskscan_core::{ItemResult, Job, JobId, JobStatus, StoreError};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) fn load_job(conn: &Connection, job_id: JobId) -> Result<Option<Job>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id=?");
    let row = conn
        .query_row(&sql, [job_id.to_string()], JobRow::read)
        .optional()
        .map_err(backend)?;
    row.map(JobRow::into_job).transpose()
}

impl Db {
    pub fn job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        load_job(&self.lock(), job_id)
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.jobs_where("1=1", params![])
    }

    /// Jobs still marked `running`; after a restart these are stale.
    pub fn running_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.jobs_where("status=?", [JobStatus::Running.as_str()])
    }

    fn jobs_where<P: rusqlite::Params>(&self, cond: &str, p: P) -> Result<Vec<Job>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE {cond} ORDER BY created_ms DESC, job_id DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map(p, JobRow::read)
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    pub fn results(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        let conn = self.lock();
        let sql =
            format!("SELECT {RESULT_COLUMNS} FROM results WHERE job_id=? ORDER BY result_seq");
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map([job_id.to_string()], ResultRow::read)
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        rows.into_iter().map(ResultRow::into_result).collect()
    }

    /// Delete a job and, by cascade, its results. Returns whether a job was removed.
    pub fn delete_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        let n = self
            .lock()
            .execute("DELETE FROM jobs WHERE job_id=?", params![job_id.to_string()])
            .map_err(backend)?;
        Ok(n > 0)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let cnt: i64 = self
            .lock()
            .query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
                [name],
                |r| r.get(0),
            )
            .map_err(backend)?;
        Ok(cnt > 0)
    }
}
