use async_trait::async_trait;
use riskscan_core::{HostProber, OpenPorts, PortService, ProbeError, ProbeReport};
use tracing::debug;

use crate::services::{banner_kind, service_name, BannerKind};
use crate::{default_top_ports, resolve, scan_connect, ScanOptions};

#[derive(Clone)]
pub struct ProbeSettings {
    /// Ports to try; empty means the curated default list.
    pub ports: Vec<u16>,
    pub scan: ScanOptions,
    /// Grab SSH/HTTP banners on open ports to fill product and version.
    pub banners: bool,
    pub banner_timeout_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            ports: default_top_ports(),
            scan: ScanOptions::default(),
            banners: true,
            banner_timeout_ms: 800,
        }
    }
}

/// [`HostProber`] backed by a TCP connect scan.
pub struct TcpProber {
    settings: ProbeSettings,
}

impl TcpProber {
    pub fn new(mut settings: ProbeSettings) -> Self {
        if settings.ports.is_empty() {
            settings.ports = default_top_ports();
        }
        TcpProber { settings }
    }

    pub fn ports(&self) -> &[u16] {
        &self.settings.ports
    }

    async fn enrich(&self, host: &str, port: u16, svc: &mut PortService) {
        let Some(kind) = banner_kind(&svc.name) else { return };
        let t = self.settings.banner_timeout_ms;
        let grabbed = match kind {
            BannerKind::Ssh => banners::grab_ssh(host, port, t).await,
            BannerKind::Http => banners::grab_http(host, port, t).await,
        };
        match grabbed {
            Ok(b) => {
                svc.product = b.product;
                svc.version = b.version;
            }
            Err(e) => debug!(host, port, error = %e, "banner grab failed"),
        }
    }
}

#[async_trait]
impl HostProber for TcpProber {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError> {
        let address = address.trim();
        if address.is_empty() || address.contains(char::is_whitespace) {
            return Err(ProbeError::InvalidAddress(address.to_string()));
        }
        let opts = &self.settings.scan;
        let ip = resolve(address, opts.dns_retries, opts.dns_retry_delay).await.map_err(|e| {
            debug!(address, error = %e, "resolution failed");
            ProbeError::Unresolvable(address.to_string())
        })?;

        let open = scan_connect(ip, &self.settings.ports, opts).await;
        debug!(
            address,
            %ip,
            tried = self.settings.ports.len(),
            open = open.len(),
            "connect scan finished"
        );

        let host = ip.to_string();
        let mut ports = OpenPorts::new();
        for port in open {
            let mut svc = PortService::open_tcp(service_name(port));
            if self.settings.banners {
                self.enrich(&host, port, &mut svc).await;
            }
            ports.insert(port, svc);
        }
        Ok(ProbeReport { address: address.to_string(), ports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn rejects_malformed_address() {
        let p = TcpProber::new(ProbeSettings::default());
        assert!(matches!(p.probe("  ").await, Err(ProbeError::InvalidAddress(_))));
        assert!(matches!(p.probe("10.0.0.1 10.0.0.2").await, Err(ProbeError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn unresolvable_host_is_an_error() {
        let p = TcpProber::new(ProbeSettings::default());
        let err = p.probe("no-such-host.invalid").await.unwrap_err();
        assert!(matches!(err, ProbeError::Unresolvable(_)));
    }

    #[tokio::test]
    async fn reports_open_ports_with_names() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let p = TcpProber::new(ProbeSettings {
            ports: vec![port],
            banners: false,
            ..Default::default()
        });
        let report = p.probe("127.0.0.1").await.unwrap();
        assert_eq!(report.address, "127.0.0.1");
        let svc = &report.ports[&port];
        assert_eq!(svc.state, "open");
        assert_eq!(svc.transport, "tcp");
        drop(listener);
    }
}
