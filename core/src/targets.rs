//! Target list parsing: comma/whitespace separated hosts, IPs and CIDR ranges.

use anyhow::{anyhow, Result};
use ipnet::IpNet;

/// Largest CIDR expansion accepted for a single entry.
pub const MAX_CIDR_HOSTS: usize = 4096;

/// Split a target spec into addresses, expanding CIDR ranges to their host addresses.
pub fn parse_targets(spec: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let parts = spec.split(|c: char| c == ',' || c.is_whitespace()).map(str::trim);
    for part in parts.filter(|s| !s.is_empty()) {
        if part.contains('/') {
            out.extend(expand_cidr(part)?);
        } else {
            out.push(part.to_string());
        }
    }
    Ok(out)
}

/// Read newline-delimited targets; `#` comments and blank lines are ignored.
pub fn parse_targets_file(text: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
        out.extend(parse_targets(line)?);
    }
    Ok(out)
}

pub fn expand_cidr(cidr: &str) -> Result<Vec<String>> {
    let net: IpNet = cidr.parse().map_err(|e| anyhow!("invalid CIDR {cidr}: {e}"))?;
    let mut hosts = Vec::new();
    for ip in net.hosts() {
        if hosts.len() == MAX_CIDR_HOSTS {
            return Err(anyhow!("CIDR {cidr} expands to more than {MAX_CIDR_HOSTS} hosts"));
        }
        hosts.push(ip.to_string());
    }
    Ok(hosts)
}
