//! The per-job state machine.
//!
//! A job runs `pending -> running -> completed | failed`. The dataset phase
//! reports progress in `[10, 50]` and the host phase in `[60, 90]`. Per-item
//! failures become sentinel results. Anything else fails the whole job.

use riskscan_core::features::{self, Item};
use riskscan_core::{
    recommend, DatasetRef, DatasetSource, HostProber, ItemResult, Job, JobId, JobStatus, NewJob,
    OpenPorts, ProgressEvent, ResultDetail, RiskClassifier, ScanStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::progress::{scale, stride};
use crate::publisher::ProgressPublisher;

const DATASET_BAND: (u8, u8) = (10, 50);
const HOST_BAND: (u8, u8) = (60, 90);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause after each dataset row.
    pub dataset_pause: Duration,
    /// Pause after each probed host.
    pub host_pause: Duration,
    /// Approximate number of progress events in the dataset phase.
    pub progress_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            dataset_pause: Duration::ZERO,
            host_pause: Duration::ZERO,
            progress_steps: 10,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub results: usize,
    pub error: Option<String>,
}

pub struct ScanOrchestrator {
    store: Arc<dyn ScanStore>,
    classifier: RiskClassifier,
    prober: Arc<dyn HostProber>,
    datasets: Arc<dyn DatasetSource>,
    publisher: Arc<ProgressPublisher>,
    config: EngineConfig,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn ScanStore>,
        classifier: RiskClassifier,
        prober: Arc<dyn HostProber>,
        datasets: Arc<dyn DatasetSource>,
        publisher: Arc<ProgressPublisher>,
    ) -> Self {
        ScanOrchestrator {
            store,
            classifier,
            prober,
            datasets,
            publisher,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    pub fn publisher(&self) -> &Arc<ProgressPublisher> {
        &self.publisher
    }

    /// Persist a pending job. Subscribe to it before [`spawn`](Self::spawn) to see every event.
    pub async fn create_job(&self, request: NewJob) -> Result<Job, EngineError> {
        let job = self.store.create_job(request).await?;
        info!(
            job_id = %job.id,
            targets = job.targets.len(),
            dataset = job.dataset.is_some(),
            "job created"
        );
        Ok(job)
    }

    /// Start the job's task.
    pub fn spawn(self: &Arc<Self>, job: &Job) -> ScanHandle {
        let orch = Arc::clone(self);
        let job_id = job.id;
        let targets = job.targets.clone();
        let dataset = job.dataset.clone();
        let task = tokio::spawn(async move { orch.run(job_id, &targets, dataset.as_ref()).await });
        ScanHandle { job_id, task }
    }

    pub async fn submit(self: &Arc<Self>, request: NewJob) -> Result<ScanHandle, EngineError> {
        let job = self.create_job(request).await?;
        Ok(self.spawn(&job))
    }

    /// Drive one pending job to a terminal state.
    ///
    /// Structural failures end in `Ok` with a `failed` outcome. `Err` means the
    /// job could not be started, or its terminal status could not be written.
    /// Subscribers are released on every path except `NotPending`, where the
    /// job belongs to another run.
    pub async fn run(
        &self,
        job_id: JobId,
        targets: &[String],
        dataset: Option<&DatasetRef>,
    ) -> Result<JobOutcome, EngineError> {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.publisher.close(job_id);
                return Err(EngineError::JobNotFound(job_id));
            }
            Err(e) => {
                error!(%job_id, error = %e, "could not load job");
                self.publisher.close(job_id);
                return Err(e.into());
            }
        };
        if job.status != JobStatus::Pending {
            return Err(EngineError::NotPending { job_id, status: job.status });
        }
        info!(
            %job_id,
            targets = targets.len(),
            dataset = ?dataset.map(|d| &d.locator),
            "scan started"
        );

        let mut run = JobRun { orch: self, job_id, progress: 0, results: 0 };
        let phases = async {
            run.advance(0, "Starting scan...").await?;
            if let Some(dataset) = dataset {
                run.dataset_phase(dataset).await?;
            }
            if !targets.is_empty() {
                run.host_phase(targets).await?;
            }
            Ok::<(), EngineError>(())
        }
        .await;

        let outcome = match phases {
            Ok(()) => run.complete().await,
            Err(e) => run.fail(e).await,
        };
        self.publisher.close(job_id);
        outcome
    }
}

/// Mutable state of one in-flight job.
struct JobRun<'a> {
    orch: &'a ScanOrchestrator,
    job_id: JobId,
    progress: u8,
    results: usize,
}

impl JobRun<'_> {
    /// Record a running-state step in the store, then announce it.
    async fn advance(
        &mut self,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        let progress = progress.max(self.progress);
        let job = self
            .orch
            .store
            .update_job_status(self.job_id, JobStatus::Running, progress, None)
            .await?;
        self.progress = job.progress.max(progress);
        self.emit(JobStatus::Running, message);
        Ok(())
    }

    fn emit(&self, status: JobStatus, message: impl Into<String>) {
        let event = ProgressEvent::new(self.job_id, self.progress, status, message);
        debug!(
            job_id = %self.job_id,
            progress = event.progress,
            status = %status,
            message = %event.message,
            "progress"
        );
        self.orch.publisher.publish(self.job_id, event);
    }

    async fn persist(&mut self, result: &ItemResult) -> Result<(), EngineError> {
        self.orch.store.create_result(result).await?;
        self.results += 1;
        Ok(())
    }

    async fn score(&self, item: Item<'_>, detail: ResultDetail, failure: &str) -> ItemResult {
        let features = features::extract(item);
        match self.orch.classifier.classify(&features).await {
            Ok(p) => {
                let recommendation = recommend(p.category.as_deref(), p.score);
                ItemResult::new(self.job_id, detail, p.score, p.category, recommendation)
            }
            Err(e) => {
                warn!(
                    job_id = %self.job_id,
                    item = detail.label(),
                    error = %e,
                    "classification failed"
                );
                ItemResult::sentinel(self.job_id, detail, format!("{failure}: {e}"))
            }
        }
    }

    async fn dataset_phase(&mut self, dataset: &DatasetRef) -> Result<(), EngineError> {
        self.advance(DATASET_BAND.0, "Processing dataset...").await?;
        let rows = self.orch.datasets.load(dataset).await?;
        let total = rows.len();
        let every = stride(total, self.orch.config.progress_steps);
        let mut findings = 0;

        for (i, row) in rows.iter().enumerate() {
            let detail = ResultDetail::Record { label: format!("Row {}", i + 1) };
            let result = match row {
                Ok(record) => {
                    self.score(Item::Record(record), detail, "Could not process row").await
                }
                Err(e) => {
                    warn!(job_id = %self.job_id, row = i + 1, error = %e, "bad dataset row");
                    ItemResult::sentinel(self.job_id, detail, format!("Could not process row: {e}"))
                }
            };
            self.persist(&result).await?;
            if result.is_finding() {
                findings += 1;
            }
            if i % every == 0 {
                let (lo, hi) = DATASET_BAND;
                let message = format!("Processing dataset: {}/{} rows", i + 1, total);
                self.advance(scale(i, total, lo, hi), message).await?;
            }
            pause(self.orch.config.dataset_pause).await;
        }

        info!(job_id = %self.job_id, rows = total, findings, "dataset processed");
        let message = format!("Dataset processed. Found {findings} potential threats.");
        self.advance(DATASET_BAND.1, message).await
    }

    async fn host_phase(&mut self, targets: &[String]) -> Result<(), EngineError> {
        self.advance(HOST_BAND.0, "Scanning network hosts...").await?;
        let total = targets.len();
        let mut findings = 0;

        for (i, address) in targets.iter().enumerate() {
            let (lo, hi) = HOST_BAND;
            let message = format!("Scanning host {}/{}: {}", i + 1, total, address);
            self.advance(scale(i, total, lo, hi), message).await?;

            let result = match self.orch.prober.probe(address).await {
                Ok(report) => {
                    let detail = ResultDetail::Host {
                        address: address.clone(),
                        open_ports: report.ports.clone(),
                    };
                    self.score(Item::Host(&report), detail, "Could not scan host").await
                }
                Err(e) => {
                    warn!(job_id = %self.job_id, %address, error = %e, "probe failed");
                    let detail = ResultDetail::Host {
                        address: address.clone(),
                        open_ports: OpenPorts::new(),
                    };
                    ItemResult::sentinel(self.job_id, detail, format!("Could not scan host: {e}"))
                }
            };
            self.persist(&result).await?;
            if result.is_finding() {
                findings += 1;
            }
            pause(self.orch.config.host_pause).await;
        }

        info!(job_id = %self.job_id, hosts = total, findings, "host scan finished");
        let message = format!("Host scan completed. Found {findings} potential threats.");
        self.advance(HOST_BAND.1, message).await
    }

    async fn complete(&mut self) -> Result<JobOutcome, EngineError> {
        let (store, job_id) = (self.orch.store.as_ref(), self.job_id);
        match store.update_job_status(job_id, JobStatus::Completed, 100, None).await {
            Ok(_) => {
                self.progress = 100;
                self.emit(JobStatus::Completed, "Scan completed successfully.");
                info!(job_id = %self.job_id, results = self.results, "scan completed");
                Ok(self.outcome(JobStatus::Completed, None))
            }
            Err(e) => {
                error!(job_id = %self.job_id, error = %e, "could not record completion");
                let message = e.to_string();
                let progress = self.progress;
                if let Err(again) = store
                    .update_job_status(job_id, JobStatus::Failed, progress, Some(&message))
                    .await
                {
                    warn!(job_id = %self.job_id, error = %again, "could not record failure either");
                }
                self.emit(JobStatus::Failed, format!("Scan failed: {message}"));
                Err(EngineError::Store(e))
            }
        }
    }

    async fn fail(&mut self, cause: EngineError) -> Result<JobOutcome, EngineError> {
        let message = cause.to_string();
        error!(job_id = %self.job_id, progress = self.progress, error = %message, "scan failed");
        let written = self
            .orch
            .store
            .update_job_status(self.job_id, JobStatus::Failed, self.progress, Some(&message))
            .await;
        self.emit(JobStatus::Failed, format!("Scan failed: {message}"));
        written?;
        Ok(self.outcome(JobStatus::Failed, Some(message)))
    }

    fn outcome(&self, status: JobStatus, error: Option<String>) -> JobOutcome {
        JobOutcome {
            job_id: self.job_id,
            status,
            progress: self.progress,
            results: self.results,
            error,
        }
    }
}

async fn pause(d: Duration) {
    tokio::task::yield_now().await;
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}

/// A spawned job. Dropping the handle detaches the task.
pub struct ScanHandle {
    job_id: JobId,
    task: JoinHandle<Result<JobOutcome, EngineError>>,
}

impl ScanHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<JobOutcome, EngineError> {
        self.task.await.map_err(|e| EngineError::Join(e.to_string()))?
    }

    /// Stop the task. The job stays `running` in the store until recovered.
    pub fn abort(&self) {
        self.task.abort();
    }
}
