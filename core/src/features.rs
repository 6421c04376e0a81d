//! Turn dataset rows and probe reports into feature maps for risk scoring.

use serde_json::Value;

use crate::model::{FeatureMap, ProbeReport, Record};

/// Ports not flagged as unusual.
pub const WELL_KNOWN_PORTS: &[u16] =
    &[21, 22, 23, 25, 53, 80, 110, 143, 443, 445, 993, 995, 3306, 3389, 5900];

pub const RDP_PORT: u16 = 3389;

/// Names of the host feature schema, in a stable order.
pub const HOST_FEATURES: &[&str] = &[
    "total_open_ports",
    "has_ssh",
    "has_http",
    "has_https",
    "has_ftp",
    "has_telnet",
    "has_smb",
    "has_rdp",
    "has_unusual_ports",
];

/// Something that can be flattened into a [`FeatureMap`].
pub enum Item<'a> {
    Record(&'a Record),
    Host(&'a ProbeReport),
}

pub fn extract(item: Item<'_>) -> FeatureMap {
    match item {
        Item::Record(r) => record_features(r),
        Item::Host(p) => host_features(p),
    }
}

/// Every field passes through unchanged.
pub fn record_features(record: &Record) -> FeatureMap {
    record.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

pub fn host_features(report: &ProbeReport) -> FeatureMap {
    let mut flags = HostFlags::default();
    for (&port, svc) in &report.ports {
        match svc.name.to_ascii_lowercase().as_str() {
            "ssh" => flags.ssh = true,
            "http" => flags.http = true,
            "https" => flags.https = true,
            "ftp" => flags.ftp = true,
            "telnet" => flags.telnet = true,
            "smb" | "netbios-ssn" | "microsoft-ds" => flags.smb = true,
            "ms-wbt-server" => flags.rdp = true,
            _ if port == RDP_PORT => flags.rdp = true,
            _ => {}
        }
        if !WELL_KNOWN_PORTS.contains(&port) {
            flags.unusual = true;
        }
    }

    let mut f = FeatureMap::new();
    f.insert("total_open_ports".into(), Value::from(report.ports.len() as u64));
    f.insert("has_ssh".into(), Value::Bool(flags.ssh));
    f.insert("has_http".into(), Value::Bool(flags.http));
    f.insert("has_https".into(), Value::Bool(flags.https));
    f.insert("has_ftp".into(), Value::Bool(flags.ftp));
    f.insert("has_telnet".into(), Value::Bool(flags.telnet));
    f.insert("has_smb".into(), Value::Bool(flags.smb));
    f.insert("has_rdp".into(), Value::Bool(flags.rdp));
    f.insert("has_unusual_ports".into(), Value::Bool(flags.unusual));
    f
}

#[derive(Default)]
struct HostFlags {
    ssh: bool,
    http: bool,
    https: bool,
    ftp: bool,
    telnet: bool,
    smb: bool,
    rdp: bool,
    unusual: bool,
}

/// Loose truthiness for features that may arrive as bools, 0/1 numbers or strings.
pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Some(Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        }
        _ => false,
    }
}

/// Numeric view of a feature; strings are parsed, anything else is `None`.
pub fn number(v: Option<&Value>) -> Option<f64> {
    match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
