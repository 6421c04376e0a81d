//! TCP connect scan with timeouts and concurrency, plus a [`TcpProber`] that
//! turns scan output into probe reports for the engine.

mod prober;
pub mod services;

pub use prober::{ProbeSettings, TcpProber};

use anyhow::{anyhow, Result};
use rand::{thread_rng, Rng};
use riskscan_core::ratelimiter::RateLimiter;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Parse a comma-separated list of ports/ranges (e.g., "22,80,443", "1-1024,8080").
pub fn parse_ports(spec: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in spec.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let s: u16 = start.trim().parse()?;
            let e: u16 = end.trim().parse()?;
            if s == 0 || e == 0 || s > e {
                return Err(anyhow!("invalid port range: {}", part));
            }
            ports.extend(s..=e);
        } else {
            let p: u16 = part.parse()?;
            if p == 0 {
                return Err(anyhow!("invalid port: {}", part));
            }
            ports.push(p);
        }
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Default commonly-used ports if none are specified.
pub fn default_top_ports() -> Vec<u16> { top_ports(100) }

/// Return the first N ports from a curated list of commonly-used ports.
pub fn top_ports(n: usize) -> Vec<u16> {
    const CURATED: &[u16] = &[
        21, 22, 23, 25, 53, 80, 110, 123, 135, 139, 143, 389, 443, 445, 465, 500, 587, 636, 993,
        995, 1080, 1194, 1352, 1433, 1521, 1723, 2049, 2375, 2376, 3000, 3128, 3268, 3306, 3389,
        4444, 4500, 5000, 5060, 5432, 5601, 5671, 5672, 5900, 5985, 5986, 6379, 7001, 7002, 8000,
        8080, 8081, 8200, 8443, 8500, 8530, 8888, 9000, 9092, 9200, 9300, 9418, 9999, 10000,
        11211, 15672, 27017,
    ];
    let take = n.min(CURATED.len());
    let mut v = CURATED[..take].to_vec();
    v.sort_unstable();
    v
}

/// Connection limits and retry policy for one host scan.
#[derive(Clone)]
pub struct ScanOptions {
    pub timeout_per_port: Duration,
    pub per_host_concurrency: usize,
    pub retries: u32,
    pub retry_delay: Duration,
    pub dns_retries: u32,
    pub dns_retry_delay: Duration,
    pub global_qps: Option<Arc<RateLimiter>>,
    pub global_limit: Option<Arc<Semaphore>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            timeout_per_port: Duration::from_millis(500),
            per_host_concurrency: 256,
            retries: 0,
            retry_delay: Duration::from_millis(50),
            dns_retries: 0,
            dns_retry_delay: Duration::from_millis(200),
            global_qps: None,
            global_limit: None,
        }
    }
}

/// Scan `ports` on an already-resolved address. Returns open ports, sorted ascending.
pub async fn scan_connect(ip: IpAddr, ports: &[u16], opts: &ScanOptions) -> Vec<u16> {
    let host_sem = Arc::new(Semaphore::new(opts.per_host_concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<u16>(ports.len().max(1));

    for &port in ports {
        let tx = tx.clone();
        let host_sem = host_sem.clone();
        let global = opts.global_limit.clone();
        let qps_rl = opts.global_qps.clone();
        let (per_port, retries, retry_delay) =
            (opts.timeout_per_port, opts.retries, opts.retry_delay);
        tokio::spawn(async move {
            let Ok(_host_permit) = host_sem.acquire_owned().await else { return };
            let _global_permit = match global {
                Some(g) => match g.acquire_owned().await {
                    Ok(p) => Some(p),
                    Err(_) => return,
                },
                None => None,
            };
            if let Some(q) = qps_rl { q.acquire().await; }
            let mut attempts = 0;
            let mut opened = false;
            while attempts <= retries {
                let result = timeout(per_port, TcpStream::connect((ip, port))).await;
                if let Ok(Ok(_stream)) = result { opened = true; break; }
                attempts += 1;
                if attempts <= retries {
                    let base = retry_delay.as_millis() as u64;
                    let exp = base.saturating_mul(1u64 << (attempts.min(6))); // cap growth
                    let jitter = thread_rng().gen_range(0..(exp / 4 + 1));
                    tokio::time::sleep(Duration::from_millis(exp + jitter)).await;
                }
            }
            if opened { let _ = tx.send(port).await; }
        });
    }
    drop(tx);

    let mut open = Vec::new();
    while let Some(p) = rx.recv().await {
        open.push(p);
    }
    open.sort_unstable();
    open
}

/// Resolve a host with limited retries. Unlike a best-effort lookup, failure is an error.
pub async fn resolve(host: &str, dns_retries: u32, retry_delay: Duration) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let attempts = dns_retries.saturating_add(1);
    let mut last_err = None;
    for i in 0..attempts {
        match tokio::net::lookup_host((host, 0u16)).await {
            Ok(mut iter) => {
                if let Some(sock) = iter.next() {
                    return Ok(sock.ip());
                }
            }
            Err(e) => last_err = Some(e),
        }
        if i + 1 < attempts && !retry_delay.is_zero() {
            tokio::time::sleep(retry_delay).await;
        }
    }
    Err(match last_err {
        Some(e) => anyhow!("failed to resolve {}: {}", host, e),
        None => anyhow!("failed to resolve {}: no addresses", host),
    })
}
