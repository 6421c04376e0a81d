use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dataset::FileDatasetSource;
use port_scan::{ProbeSettings, ScanOptions, TcpProber};
use results_sqlite::Db;
use riskscan_core::ratelimiter::RateLimiter;
use riskscan_core::report::RiskSummary;
use riskscan_core::targets::{parse_targets, parse_targets_file};
use riskscan_core::{
    DatasetRef, HeuristicModel, ItemResult, Job, JobId, JobStatus, NewJob, ProgressEvent,
    RandomModel, ResultDetail, RiskBand, RiskClassifier, RiskModel, ScanStore,
};
use scan_engine::{EngineConfig, ProgressPublisher, ScanOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

const DEFAULT_LOG_FILTER: &str = "riskscan=info,scan_engine=info";

fn fmt_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ModelKind { Random, Heuristic }

#[derive(Debug, Parser)]
#[command(
    name = "riskscan",
    version,
    about = "Scan hosts and datasets, score their risk, keep the results"
)]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./riskscan.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database holding jobs and results (default: riskscan.db)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,
    /// Log level for riskscan crates; overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    /// Ports: comma/range list (e.g., 22,80,443 or 1-1024,8080). Default: common ports.
    #[arg(long)]
    ports: Option<String>,
    /// Select top N common ports (conflicts with --ports)
    #[arg(long, conflicts_with = "ports")]
    top: Option<usize>,
    /// Timeout per port in milliseconds [default: 500]
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Max concurrent connections per host [default: 256]
    #[arg(long)]
    concurrency: Option<usize>,
    /// Retries per port on failure [default: 0]
    #[arg(long)]
    retries: Option<u32>,
    /// Base delay between retries in milliseconds [default: 50]
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    /// QPS cap for connection attempts; 0 disables pacing
    #[arg(long)]
    qps: Option<u32>,
    /// Skip SSH/HTTP banner grabbing on open ports
    #[arg(long, default_value_t = false)]
    no_banners: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Comma-separated hosts, IPs or CIDR ranges
    targets: Option<String>,
    /// File with newline-delimited targets (comments with # and blanks ignored)
    #[arg(long, value_name = "FILE")]
    targets_file: Option<PathBuf>,
    /// Dataset of records to classify (.csv or .json)
    #[arg(long, value_name = "FILE")]
    dataset: Option<PathBuf>,
    #[command(flatten)]
    probe: ProbeArgs,
    /// Risk model [default: random]
    #[arg(long, value_enum)]
    model: Option<ModelKind>,
    /// Seed for the random model
    #[arg(long)]
    seed: Option<u64>,
    /// Output format: text, json, or jsonl
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Do not print progress events
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Run a scan job and stream its progress
    Scan(ScanArgs),
    /// List jobs, newest first
    Jobs {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show a job and its results
    Show {
        job_id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Summarize a job's results by risk band
    Report {
        job_id: String,
        /// Also write the result table as CSV
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Delete a job and its results
    Delete { job_id: String },
    /// Mark jobs left running by a crashed process as failed
    Recover,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(format!(
            "riskscan={l},scan_engine={l},results_sqlite={l},port_scan={l},dataset={l}"
        )),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let cfg = config::load_config(cli.config.as_deref())?;
    let db_path = cfg.db_path(cli.db.clone());
    match cli.command {
        Commands::Version => {
            println!("riskscan {} (core {})", env!("CARGO_PKG_VERSION"), riskscan_core::version());
        }
        Commands::Scan(args) => scan(&cfg, &db_path, args)?,
        Commands::Jobs { format } => {
            let db = Db::open_or_create(&db_path)?;
            let jobs = db.list_jobs()?;
            match format {
                OutputFormat::Text if jobs.is_empty() => println!("no jobs"),
                OutputFormat::Text => jobs.iter().for_each(|j| println!("{}", job_line(j))),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
                OutputFormat::Jsonl => {
                    for j in &jobs {
                        println!("{}", serde_json::to_string(j)?);
                    }
                }
            }
        }
        Commands::Show { job_id, format } => {
            let db = Db::open_or_create(&db_path)?;
            let job = find_job(&db, &job_id)?;
            let results = db.results(job.id)?;
            print_results(&job, &results, format)?;
        }
        Commands::Report { job_id, csv, format } => {
            let db = Db::open_or_create(&db_path)?;
            let job = find_job(&db, &job_id)?;
            let results = db.results(job.id)?;
            let summary = RiskSummary::from_results(&results);
            match format {
                OutputFormat::Text => {
                    let s = &summary;
                    println!("{}", job_line(&job));
                    println!("total {}: {} records, {} hosts", s.total, s.records, s.hosts);
                    println!("high {}  medium {}  low {}", s.high, s.medium, s.low);
                    println!("findings {}  failed items {}", s.findings, s.failed_items);
                    if let Some(err) = &job.error {
                        println!("error: {err}");
                    }
                }
                OutputFormat::Json | OutputFormat::Jsonl => {
                    let obj = serde_json::json!({ "job": job, "summary": summary });
                    println!("{}", serde_json::to_string(&obj)?);
                }
            }
            if let Some(path) = csv {
                write_csv(&path, &results)?;
                info!(path = %path.display(), rows = results.len(), "report written");
            }
        }
        Commands::Delete { job_id } => {
            let db = Db::open_or_create(&db_path)?;
            let id = parse_job_id(&job_id)?;
            if !db.delete_job(id)? {
                bail!("job not found: {id}");
            }
            println!("deleted {id}");
        }
        Commands::Recover => {
            let db = Db::open_or_create(&db_path)?;
            let stale = recover_interrupted(&db)?;
            println!("recovered {} job(s)", stale.len());
        }
    }
    Ok(())
}

/// Fail every job still marked `running`. Returns the jobs as they were found.
fn recover_interrupted(db: &Db) -> Result<Vec<Job>> {
    let stale = db.running_jobs()?;
    for job in &stale {
        db.set_status(job.id, JobStatus::Failed, job.progress, Some("interrupted"))?;
        warn!(job_id = %job.id, progress = job.progress, "marked interrupted job failed");
    }
    Ok(stale)
}

fn scan(cfg: &Config, db_path: &Path, args: ScanArgs) -> Result<()> {
    let mut targets = Vec::new();
    if let Some(spec) = &args.targets {
        targets.extend(parse_targets(spec)?);
    }
    if let Some(file) = &args.targets_file {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        targets.extend(parse_targets_file(&text)?);
    }
    let dataset = args.dataset.as_ref().map(DatasetRef::path);
    if targets.is_empty() && dataset.is_none() {
        warn!("no targets and no dataset; the job will complete empty");
    }

    let p = &cfg.probe;
    let (ports_spec, top) = if args.probe.ports.is_some() || args.probe.top.is_some() {
        (args.probe.ports.clone(), args.probe.top)
    } else {
        (p.ports.clone(), p.top)
    };
    let ports = match (ports_spec, top) {
        (Some(spec), _) => port_scan::parse_ports(&spec)?,
        (None, Some(0)) => bail!("--top must be > 0"),
        (None, Some(n)) => port_scan::top_ports(n),
        (None, None) => port_scan::default_top_ports(),
    };
    let timeout_ms = args.probe.timeout_ms.or(p.timeout_ms).unwrap_or(500);
    let concurrency = args.probe.concurrency.or(p.concurrency).unwrap_or(256);
    let retries = args.probe.retries.or(p.retries).unwrap_or(0);
    let retry_delay_ms = args.probe.retry_delay_ms.or(p.retry_delay_ms).unwrap_or(50);
    let qps = args.probe.qps.or(p.qps).unwrap_or(0);
    let banners = !args.probe.no_banners && p.banners.unwrap_or(true);

    let e = &cfg.engine;
    let engine = EngineConfig {
        dataset_pause: Duration::from_millis(e.dataset_pause_ms.unwrap_or(0)),
        host_pause: Duration::from_millis(e.host_pause_ms.unwrap_or(0)),
        progress_steps: e.progress_steps.unwrap_or(10),
    };

    let kind = args
        .model
        .or_else(|| match cfg.model.kind.as_deref() {
            Some("heuristic") => Some(ModelKind::Heuristic),
            Some(_) => Some(ModelKind::Random),
            None => None,
        })
        .unwrap_or(ModelKind::Random);
    let model: Arc<dyn RiskModel> = match (kind, args.seed.or(cfg.model.seed)) {
        (ModelKind::Heuristic, _) => Arc::new(HeuristicModel),
        (ModelKind::Random, Some(seed)) => Arc::new(RandomModel::seeded(seed)),
        (ModelKind::Random, None) => Arc::new(RandomModel::new()),
    };

    let db = Arc::new(Db::open_or_create(db_path)?);
    let store: Arc<dyn ScanStore> = db.clone();
    let (format, quiet) = (args.format, args.quiet);
    info!(
        db = %db_path.display(),
        targets = targets.len(),
        ports = ports.len(),
        model = ?kind,
        "starting scan"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async move {
        let global_qps = if qps == 0 { None } else { Some(Arc::new(RateLimiter::new(qps))) };
        let prober = TcpProber::new(ProbeSettings {
            ports,
            scan: ScanOptions {
                timeout_per_port: Duration::from_millis(timeout_ms),
                per_host_concurrency: concurrency,
                retries,
                retry_delay: Duration::from_millis(retry_delay_ms),
                global_qps,
                ..ScanOptions::default()
            },
            banners,
            ..ProbeSettings::default()
        });
        let orch = Arc::new(
            ScanOrchestrator::new(
                store,
                RiskClassifier::new(model),
                Arc::new(prober),
                Arc::new(FileDatasetSource),
                Arc::new(ProgressPublisher::new()),
            )
            .with_config(engine),
        );

        let job = orch.create_job(NewJob::new(targets, dataset)).await?;
        let mut events = orch.publisher().subscribe(job.id);
        let finished = orch.spawn(&job).wait();
        tokio::pin!(finished);
        // The task can end without a terminal event (startup errors, panics).
        let outcome = loop {
            tokio::select! {
                biased;
                ev = events.recv() => match ev {
                    Some(ev) => {
                        if !quiet {
                            print_event(&ev, format)?;
                        }
                        if ev.is_terminal() {
                            break (&mut finished).await?;
                        }
                    }
                    None => break (&mut finished).await?,
                },
                outcome = &mut finished => {
                    while let Some(ev) = events.try_recv() {
                        if !quiet {
                            print_event(&ev, format)?;
                        }
                    }
                    break outcome?;
                }
            }
        };
        Ok::<_, anyhow::Error>(outcome)
    })?;

    let job = db
        .job(outcome.job_id)?
        .with_context(|| format!("job {} vanished", outcome.job_id))?;
    let results = db.results(job.id)?;
    print_results(&job, &results, format)?;
    if outcome.status == JobStatus::Failed {
        bail!("scan {} failed: {}", job.id, outcome.error.unwrap_or_default());
    }
    Ok(())
}

fn print_event(ev: &ProgressEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Jsonl => println!("{}", serde_json::to_string(ev)?),
        OutputFormat::Text | OutputFormat::Json => {
            eprintln!("[{:>3}%] {:<9} {}", ev.progress, ev.status, ev.message)
        }
    }
    Ok(())
}

fn parse_job_id(s: &str) -> Result<JobId> {
    s.trim().parse::<JobId>().with_context(|| format!("invalid job id: {s}"))
}

fn find_job(db: &Db, s: &str) -> Result<Job> {
    let id = parse_job_id(s)?;
    db.job(id)?.with_context(|| format!("job not found: {id}"))
}

fn job_line(j: &Job) -> String {
    let dataset =
        j.dataset.as_ref().map(|d| d.name.as_deref().unwrap_or(&d.locator)).unwrap_or("-");
    format!(
        "{}  {:<9} {:>3}%  targets={} dataset={}  created={}",
        j.id,
        j.status,
        j.progress,
        j.targets.len(),
        dataset,
        fmt_ms(j.created_ms)
    )
}

fn band_label(r: &ItemResult) -> &'static str {
    if r.is_sentinel() { "failed" } else { RiskBand::from_score(r.risk_score).as_str() }
}

fn port_list(r: &ItemResult) -> String {
    match &r.detail {
        ResultDetail::Host { open_ports, .. } => {
            let ports: Vec<String> =
                open_ports.iter().map(|(p, s)| format!("{}/{}", p, s.name)).collect();
            ports.join(" ")
        }
        ResultDetail::Record { .. } => String::new(),
    }
}

fn print_results(job: &Job, results: &[ItemResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", job_line(job));
            if let Some(err) = &job.error {
                println!("error: {err}");
            }
            for r in results {
                println!(
                    "  {:<20} {:<6} {:>6.1} {:<6} {:<28} {}",
                    r.detail.label(),
                    r.detail.kind(),
                    r.risk_score,
                    band_label(r),
                    r.category.as_deref().unwrap_or("-"),
                    r.recommendation
                );
                let ports = port_list(r);
                if !ports.is_empty() {
                    println!("  {:<20} ports: {}", "", ports);
                }
            }
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({ "job": job, "results": results });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
        OutputFormat::Jsonl => {
            for r in results {
                println!("{}", serde_json::to_string(r)?);
            }
        }
    }
    Ok(())
}

fn write_csv(path: &Path, results: &[ItemResult]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::fs::File::create(path)?);
    wtr.write_record([
        "result_id",
        "kind",
        "label",
        "risk_score",
        "band",
        "category",
        "recommendation",
        "open_ports",
        "created_at",
    ])?;
    for r in results {
        wtr.write_record([
            r.id.to_string(),
            r.detail.kind().to_string(),
            r.detail.label().to_string(),
            format!("{:.2}", r.risk_score),
            band_label(r).to_string(),
            r.category.clone().unwrap_or_default(),
            r.recommendation.clone(),
            port_list(r),
            fmt_ms(r.created_ms),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
