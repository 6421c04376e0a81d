use riskscan_core::{DatasetRef, ItemResult, Job, OpenPorts, ResultDetail, StoreError};
use rusqlite::Row;
use uuid::Uuid;

pub(crate) const JOB_COLUMNS: &str = "job_id, targets_json, dataset_locator, dataset_name, \
     status, progress, error, created_ms, updated_ms";

pub(crate) const RESULT_COLUMNS: &str = "result_id, job_id, kind, label, risk_score, \
     category, recommendation, open_ports_json, created_ms";

/// Raw `jobs` row, decoded outside the rusqlite closure so parse errors stay typed.
pub(crate) struct JobRow {
    job_id: String,
    targets_json: String,
    dataset_locator: Option<String>,
    dataset_name: Option<String>,
    status: String,
    progress: i64,
    error: Option<String>,
    created_ms: i64,
    updated_ms: i64,
}

impl JobRow {
    pub(crate) fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(JobRow {
            job_id: r.get(0)?,
            targets_json: r.get(1)?,
            dataset_locator: r.get(2)?,
            dataset_name: r.get(3)?,
            status: r.get(4)?,
            progress: r.get(5)?,
            error: r.get(6)?,
            created_ms: r.get(7)?,
            updated_ms: r.get(8)?,
        })
    }

    pub(crate) fn into_job(self) -> Result<Job, StoreError> {
        Ok(Job {
            id: parse_id(&self.job_id)?,
            targets: serde_json::from_str(&self.targets_json)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            dataset: self
                .dataset_locator
                .map(|locator| DatasetRef { locator, name: self.dataset_name }),
            status: self.status.parse()?,
            progress: u8::try_from(self.progress.clamp(0, 100)).unwrap_or(0),
            error: self.error,
            created_ms: self.created_ms,
            updated_ms: self.updated_ms,
        })
    }
}

pub(crate) struct ResultRow {
    result_id: String,
    job_id: String,
    kind: String,
    label: String,
    risk_score: f64,
    category: Option<String>,
    recommendation: String,
    open_ports_json: Option<String>,
    created_ms: i64,
}

impl ResultRow {
    pub(crate) fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ResultRow {
            result_id: r.get(0)?,
            job_id: r.get(1)?,
            kind: r.get(2)?,
            label: r.get(3)?,
            risk_score: r.get(4)?,
            category: r.get(5)?,
            recommendation: r.get(6)?,
            open_ports_json: r.get(7)?,
            created_ms: r.get(8)?,
        })
    }

    pub(crate) fn into_result(self) -> Result<ItemResult, StoreError> {
        let detail = match self.kind.as_str() {
            "record" => ResultDetail::Record { label: self.label },
            "host" => {
                let open_ports: OpenPorts = match self.open_ports_json.as_deref() {
                    Some(s) if !s.is_empty() => {
                        serde_json::from_str(s).map_err(|e| StoreError::Corrupt(e.to_string()))?
                    }
                    _ => OpenPorts::new(),
                };
                ResultDetail::Host { address: self.label, open_ports }
            }
            other => return Err(StoreError::Corrupt(format!("unknown result kind: {other}"))),
        };
        Ok(ItemResult {
            id: parse_id(&self.result_id)?,
            job_id: parse_id(&self.job_id)?,
            risk_score: self.risk_score,
            category: self.category,
            recommendation: self.recommendation,
            created_ms: self.created_ms,
            detail,
        })
    }
}

fn parse_id(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("bad id {s}: {e}")))
}
