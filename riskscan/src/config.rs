use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "riskscan.yaml";
pub const DEFAULT_DB: &str = "riskscan.db";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct StoreConfig {
    pub db: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ProbeConfig {
    pub ports: Option<String>,
    pub top: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub qps: Option<u32>,
    pub banners: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct EngineSection {
    pub dataset_pause_ms: Option<u64>,
    pub host_pause_ms: Option<u64>,
    pub progress_steps: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ModelConfig {
    pub kind: Option<String>,
    pub seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub model: ModelConfig,
}

impl Config {
    pub fn db_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.store.db.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_DB))
    }
}

/// An explicit path must exist; otherwise `./riskscan.yaml` is used when present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&s).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(s)?;
    if let Some(kind) = &cfg.model.kind {
        if !matches!(kind.as_str(), "random" | "heuristic") {
            bail!("model.kind must be random or heuristic, got {kind:?}");
        }
    }
    Ok(cfg)
}
