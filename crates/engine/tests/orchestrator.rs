use async_trait::async_trait;
use results_sqlite::Db;
use riskscan_core::{
    ClassifyError, DatasetError, DatasetRef, DatasetSource, FeatureMap, HostProber, ItemResult, Job,
    JobId, JobStatus, NewJob, PortService, Prediction, ProbeError, ProbeReport, Record, RecordRow,
    ResultDetail, ResultId, RiskClassifier, RiskModel, ScanStore, StoreError, SCAN_FAILED,
};
use scan_engine::{EngineError, ProgressPublisher, ScanOrchestrator};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FixedModel(Prediction);

#[async_trait]
impl RiskModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }
    async fn predict(&self, _features: &FeatureMap) -> Result<Prediction, ClassifyError> {
        Ok(self.0.clone())
    }
}

struct DownModel;

#[async_trait]
impl RiskModel for DownModel {
    fn name(&self) -> &str {
        "down"
    }
    async fn predict(&self, _features: &FeatureMap) -> Result<Prediction, ClassifyError> {
        Err(ClassifyError::Unavailable("model not loaded".into()))
    }
}

/// Answers from a fixed table; unknown addresses are unreachable.
#[derive(Default)]
struct ScriptedProber {
    open: HashMap<String, Vec<(u16, &'static str)>>,
    calls: AtomicUsize,
}

impl ScriptedProber {
    fn with(mut self, address: &str, ports: &[(u16, &'static str)]) -> Self {
        self.open.insert(address.to_string(), ports.to_vec());
        self
    }
}

#[async_trait]
impl HostProber for ScriptedProber {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ports = self
            .open
            .get(address)
            .ok_or_else(|| ProbeError::Failed("host unreachable".into()))?;
        Ok(ProbeReport {
            address: address.to_string(),
            ports: ports.iter().map(|&(p, name)| (p, PortService::open_tcp(name))).collect(),
        })
    }
}

/// Serves rows for `.csv` locators and rejects everything else. `None` is a bad row.
struct MemoryDataset(Vec<Option<Record>>);

#[async_trait]
impl DatasetSource for MemoryDataset {
    async fn load(&self, reference: &DatasetRef) -> Result<Vec<RecordRow>, DatasetError> {
        if !reference.locator.ends_with(".csv") {
            return Err(DatasetError::Unsupported(reference.locator.clone()));
        }
        let rows = self.0.iter().enumerate().map(|(i, row)| {
            row.clone()
                .ok_or_else(|| DatasetError::Malformed(format!("row {} is not an object", i + 1)))
        });
        Ok(rows.collect())
    }
}

/// Delegates to SQLite but refuses to record completion.
struct NoCompletion(Db);

#[async_trait]
impl ScanStore for NoCompletion {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        self.0.create_job(job).await
    }
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        self.0.get_job(job_id).await
    }
    async fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> Result<Job, StoreError> {
        if status == JobStatus::Completed {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.0.update_job_status(job_id, status, progress, error).await
    }
    async fn create_result(&self, result: &ItemResult) -> Result<ResultId, StoreError> {
        self.0.create_result(result).await
    }
    async fn results_for_job(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        self.0.results_for_job(job_id).await
    }
}

/// Delegates to SQLite, but every job lookup reports a locked database.
struct LockedStore(Db);

#[async_trait]
impl ScanStore for LockedStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        self.0.create_job(job).await
    }
    async fn get_job(&self, _job_id: JobId) -> Result<Option<Job>, StoreError> {
        Err(StoreError::Backend("database is locked".into()))
    }
    async fn update_job_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> Result<Job, StoreError> {
        self.0.update_job_status(job_id, status, progress, error).await
    }
    async fn create_result(&self, result: &ItemResult) -> Result<ResultId, StoreError> {
        self.0.create_result(result).await
    }
    async fn results_for_job(&self, job_id: JobId) -> Result<Vec<ItemResult>, StoreError> {
        self.0.results_for_job(job_id).await
    }
}

fn rows(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| match json!({ "packet_count": i * 10, "proto": "tcp" }) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        })
        .collect()
}

fn engine(
    store: Arc<dyn ScanStore>,
    model: Arc<dyn RiskModel>,
    prober: Arc<dyn HostProber>,
    records: Vec<Record>,
) -> Arc<ScanOrchestrator> {
    let dataset = MemoryDataset(records.into_iter().map(Some).collect());
    engine_over(store, model, prober, dataset)
}

fn engine_over(
    store: Arc<dyn ScanStore>,
    model: Arc<dyn RiskModel>,
    prober: Arc<dyn HostProber>,
    dataset: MemoryDataset,
) -> Arc<ScanOrchestrator> {
    Arc::new(ScanOrchestrator::new(
        store,
        RiskClassifier::new(model),
        prober,
        Arc::new(dataset),
        Arc::new(ProgressPublisher::new()),
    ))
}

fn dataset_only(locator: &str) -> NewJob {
    NewJob::new(Vec::<String>::new(), Some(DatasetRef::path(locator)))
}

fn memory_store() -> Arc<dyn ScanStore> {
    Arc::new(Db::open_in_memory().unwrap())
}

fn threat() -> Arc<dyn RiskModel> {
    Arc::new(FixedModel(Prediction::threat(42.0, "Trojan")))
}

/// Run a job end to end while collecting every event it publishes.
async fn run_collect(
    orch: &Arc<ScanOrchestrator>,
    request: NewJob,
) -> (Job, Result<scan_engine::JobOutcome, EngineError>, Vec<riskscan_core::ProgressEvent>) {
    let job = orch.create_job(request).await.unwrap();
    let mut sub = orch.publisher().subscribe(job.id);
    let outcome = orch.spawn(&job).wait().await;
    let mut events = Vec::new();
    while let Some(ev) = sub.recv().await {
        events.push(ev);
    }
    (job, outcome, events)
}

#[tokio::test]
async fn dataset_and_hosts_with_one_failed_probe() {
    let store = memory_store();
    let prober =
        Arc::new(ScriptedProber::default().with("10.0.0.1", &[(22, "ssh"), (80, "http")]));
    let orch = engine(store.clone(), threat(), prober, rows(3));
    let request = NewJob::new(["10.0.0.1", "10.0.0.9"], Some(DatasetRef::path("traffic.csv")));

    let (job, outcome, events) = run_collect(&orch, request).await;
    let outcome = outcome.unwrap();
    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.progress, 100);
    assert_eq!(outcome.results, 5);

    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![0, 10, 10, 23, 36, 50, 60, 60, 75, 90, 100]);
    assert_eq!(events[0].message, "Starting scan...");
    assert_eq!(events[5].message, "Dataset processed. Found 3 potential threats.");
    assert_eq!(events[8].message, "Scanning host 2/2: 10.0.0.9");
    assert_eq!(events[9].message, "Host scan completed. Found 1 potential threats.");
    let last = events.last().unwrap();
    assert_eq!(
        (last.status, last.message.as_str()),
        (JobStatus::Completed, "Scan completed successfully.")
    );
    assert!(events[..events.len() - 1].iter().all(|e| e.status == JobStatus::Running));

    let results = store.results_for_job(job.id).await.unwrap();
    let labels: Vec<&str> = results.iter().map(|r| r.detail.label()).collect();
    assert_eq!(labels, vec!["Row 1", "Row 2", "Row 3", "10.0.0.1", "10.0.0.9"]);
    assert!(results[..3].iter().all(|r| r.category.as_deref() == Some("Trojan")));
    assert_eq!(
        results[0].recommendation,
        "Medium risk Trojan detected. Investigate further and consider isolation."
    );
    match &results[3].detail {
        ResultDetail::Host { open_ports, .. } => {
            assert_eq!(open_ports.keys().copied().collect::<Vec<_>>(), [22, 80])
        }
        other => panic!("expected host result, got {other:?}"),
    }
    let failed = &results[4];
    assert_eq!(failed.category.as_deref(), Some(SCAN_FAILED));
    assert_eq!(failed.risk_score, 0.0);
    assert!(failed.recommendation.starts_with("Could not scan host: "));

    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!((stored.status, stored.progress), (JobStatus::Completed, 100));
}

#[tokio::test]
async fn empty_job_completes_without_results() {
    let store = memory_store();
    let orch = engine(store.clone(), threat(), Arc::new(ScriptedProber::default()), vec![]);
    let (job, outcome, events) = run_collect(&orch, NewJob::default()).await;

    let outcome = outcome.unwrap();
    assert_eq!((outcome.status, outcome.results), (JobStatus::Completed, 0));
    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![0, 100]);
    assert!(store.results_for_job(job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_dataset_fails_the_job() {
    let store = memory_store();
    let prober = Arc::new(ScriptedProber::default().with("10.0.0.1", &[(22, "ssh")]));
    let orch = engine(store.clone(), threat(), prober.clone(), rows(2));
    let request = NewJob::new(["10.0.0.1"], Some(DatasetRef::path("report.xlsx")));

    let (job, outcome, events) = run_collect(&orch, request).await;
    let outcome = outcome.unwrap();
    assert_eq!(outcome.status, JobStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().starts_with("Unsupported file format"));

    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Failed);
    assert!(last.progress < 100);
    assert!(last.message.starts_with("Scan failed: Unsupported file format"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    assert!(store.results_for_job(job.id).await.unwrap().is_empty());
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.error.is_some());
}

#[tokio::test]
async fn classifier_outage_yields_row_sentinels() {
    let store = memory_store();
    let prober = Arc::new(ScriptedProber::default());
    let orch = engine(store.clone(), Arc::new(DownModel), prober, rows(2));
    let (job, outcome, _) = run_collect(&orch, dataset_only("a.csv")).await;

    assert_eq!(outcome.unwrap().status, JobStatus::Completed);
    let results = store.results_for_job(job.id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(ItemResult::is_sentinel));
    assert!(results[0].recommendation.starts_with("Could not process row: "));
}

#[tokio::test]
async fn classifier_outage_yields_host_sentinels() {
    let store = memory_store();
    let prober = Arc::new(ScriptedProber::default().with("10.0.0.5", &[(22, "ssh")]));
    let orch = engine(store.clone(), Arc::new(DownModel), prober.clone(), vec![]);
    let (job, outcome, events) = run_collect(&orch, NewJob::new(["10.0.0.5"], None)).await;

    let outcome = outcome.unwrap();
    assert_eq!((outcome.status, outcome.results), (JobStatus::Completed, 1));
    assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    let done = events.iter().find(|e| e.message.starts_with("Host scan completed")).unwrap();
    assert_eq!(done.message, "Host scan completed. Found 0 potential threats.");

    let results = store.results_for_job(job.id).await.unwrap();
    assert_eq!(results.len(), 1);
    let host = &results[0];
    assert!(host.is_sentinel());
    assert_eq!(host.risk_score, 0.0);
    assert_eq!(
        host.recommendation,
        "Could not scan host: risk model unavailable: model not loaded"
    );
    match &host.detail {
        ResultDetail::Host { address, open_ports } => {
            assert_eq!(address, "10.0.0.5");
            assert!(open_ports.contains_key(&22));
        }
        other => panic!("expected host result, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_row_is_isolated() {
    let store = memory_store();
    let mut records: Vec<Option<Record>> = rows(3).into_iter().map(Some).collect();
    records[1] = None;
    let prober = Arc::new(ScriptedProber::default());
    let orch = engine_over(store.clone(), threat(), prober, MemoryDataset(records));
    let (job, outcome, events) = run_collect(&orch, dataset_only("mixed.csv")).await;

    let outcome = outcome.unwrap();
    assert_eq!((outcome.status, outcome.results), (JobStatus::Completed, 3));
    assert!(outcome.error.is_none());
    assert!(events.iter().any(|e| e.message == "Dataset processed. Found 2 potential threats."));

    let results = store.results_for_job(job.id).await.unwrap();
    let labels: Vec<&str> = results.iter().map(|r| r.detail.label()).collect();
    assert_eq!(labels, vec!["Row 1", "Row 2", "Row 3"]);
    assert!(!results[0].is_sentinel() && !results[2].is_sentinel());
    assert!(results[1].is_sentinel());
    assert_eq!(
        results[1].recommendation,
        "Could not process row: malformed dataset: row 2 is not an object"
    );
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!((stored.status, stored.progress), (JobStatus::Completed, 100));
}

#[tokio::test]
async fn progress_is_monotonic_for_large_datasets() {
    let store = memory_store();
    let prober = ScriptedProber::default().with("a", &[]).with("b", &[(3389, "ms-wbt-server")]);
    let prober = Arc::new(prober);
    let orch = engine(store, threat(), prober, rows(57));
    let request = NewJob::new(["a", "b", "c"], Some(DatasetRef::path("big.csv")));

    let (_, outcome, events) = run_collect(&orch, request).await;
    assert_eq!(outcome.unwrap().results, 60);
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    let dataset_rows =
        events.iter().filter(|e| e.message.starts_with("Processing dataset: ")).count();
    // stride = 57 / 10 = 5 -> rows 0, 5, ..., 55
    assert_eq!(dataset_rows, 12);
    assert_eq!(events.last().map(|e| e.progress), Some(100));
}

#[tokio::test]
async fn run_rejects_jobs_that_are_not_pending() {
    let store = memory_store();
    let orch = engine(store, threat(), Arc::new(ScriptedProber::default()), vec![]);
    let job = orch.create_job(NewJob::default()).await.unwrap();
    orch.run(job.id, &[], None).await.unwrap();

    let again = orch.run(job.id, &[], None).await;
    assert!(matches!(again, Err(EngineError::NotPending { status: JobStatus::Completed, .. })));
    let missing = orch.run(uuid::Uuid::now_v7(), &[], None).await;
    assert!(matches!(missing, Err(EngineError::JobNotFound(_))));
}

#[tokio::test]
async fn terminal_write_failure_is_propagated() {
    let store: Arc<dyn ScanStore> = Arc::new(NoCompletion(Db::open_in_memory().unwrap()));
    let prober = Arc::new(ScriptedProber::default().with("h", &[]));
    let orch = engine(store.clone(), threat(), prober, vec![]);
    let (job, outcome, events) = run_collect(&orch, NewJob::new(["h"], None)).await;

    assert!(matches!(outcome, Err(EngineError::Store(StoreError::Backend(_)))));
    let last = events.last().unwrap();
    assert_eq!((last.status, last.progress), (JobStatus::Failed, 90));
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("storage backend: disk full"));
}

#[tokio::test]
async fn startup_store_error_releases_subscribers() {
    let store: Arc<dyn ScanStore> = Arc::new(LockedStore(Db::open_in_memory().unwrap()));
    let orch = engine(store, threat(), Arc::new(ScriptedProber::default()), vec![]);
    let job = orch.create_job(NewJob::new(["h"], None)).await.unwrap();
    let mut sub = orch.publisher().subscribe(job.id);

    let outcome = orch.spawn(&job).wait().await;
    match outcome {
        Err(EngineError::Store(StoreError::Backend(msg))) => assert_eq!(msg, "database is locked"),
        other => panic!("expected a store error, got {other:?}"),
    }
    let next = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await;
    assert!(matches!(next, Ok(None)), "subscription stayed open: {next:?}");
    assert_eq!(orch.publisher().subscriber_count(job.id), 0);
}

#[tokio::test]
async fn missing_job_releases_subscribers() {
    let orch = engine(memory_store(), threat(), Arc::new(ScriptedProber::default()), vec![]);
    let job_id = uuid::Uuid::now_v7();
    let mut sub = orch.publisher().subscribe(job_id);

    let outcome = orch.run(job_id, &[], None).await;
    assert!(matches!(outcome, Err(EngineError::JobNotFound(id)) if id == job_id));
    let next = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await;
    assert!(matches!(next, Ok(None)));
    assert_eq!(orch.publisher().subscriber_count(job_id), 0);
}

#[tokio::test]
async fn not_pending_leaves_subscribers_alone() {
    let orch = engine(memory_store(), threat(), Arc::new(ScriptedProber::default()), vec![]);
    let job = orch.create_job(NewJob::default()).await.unwrap();
    orch.run(job.id, &[], None).await.unwrap();

    let _sub = orch.publisher().subscribe(job.id);
    let again = orch.run(job.id, &[], None).await;
    assert!(matches!(again, Err(EngineError::NotPending { .. })));
    assert_eq!(orch.publisher().subscriber_count(job.id), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_stay_isolated() {
    let store = memory_store();
    let orch = engine(store.clone(), threat(), Arc::new(ScriptedProber::default()), rows(4));

    let mut handles = Vec::new();
    for _ in 0..6 {
        handles.push(orch.submit(dataset_only("shared.csv")).await.unwrap());
    }
    let mut ids = Vec::new();
    for h in handles {
        let id = h.job_id();
        let outcome = h.wait().await.unwrap();
        assert_eq!(
            (outcome.job_id, outcome.status, outcome.results),
            (id, JobStatus::Completed, 4)
        );
        ids.push(id);
    }
    for id in ids {
        let results = store.results_for_job(id).await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.job_id == id));
    }
}
