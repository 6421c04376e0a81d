//! Banner grabbing for plaintext HTTP and SSH, reduced to a product/version pair.

use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub protocol: String,
    pub port: u16,
    pub summary: String,
    pub product: Option<String>,
    pub version: Option<String>,
}

async fn connect(host: &str, port: u16, timeout_ms: u64) -> Result<TcpStream> {
    let addr = resolve_first(host, port).await?;
    Ok(timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr)).await??)
}

pub async fn grab_http(host: &str, port: u16, timeout_ms: u64) -> Result<Banner> {
    let mut stream = connect(host, port, timeout_ms).await?;
    let req = format!(
        "HEAD / HTTP/1.0\r\nHost: {}\r\nUser-Agent: riskscan/0.1\r\nConnection: close\r\n\r\n",
        host
    );
    timeout(Duration::from_millis(timeout_ms), stream.write_all(req.as_bytes())).await??;
    let mut buf = vec![0u8; 4096];
    let n = timeout(Duration::from_millis(timeout_ms), stream.read(&mut buf)).await??;
    let text = String::from_utf8_lossy(&buf[..n]);
    let mut first = String::new();
    let mut server = String::new();
    for (i, line) in text.lines().enumerate() {
        if i == 0 { first = line.to_string(); }
        if line.to_lowercase().starts_with("server:") { server = line[7..].trim().to_string(); }
        if i > 10 { break; }
    }
    if !first.starts_with("HTTP/") {
        return Err(anyhow!("not an HTTP response on port {}", port));
    }
    let (product, version) = parse_server_header(&server);
    let summary = if server.is_empty() { first } else { format!("{} | Server: {}", first, server) };
    Ok(Banner { protocol: "http".into(), port, summary, product, version })
}

pub async fn grab_ssh(host: &str, port: u16, timeout_ms: u64) -> Result<Banner> {
    let mut stream = connect(host, port, timeout_ms).await?;
    let mut buf = vec![0u8; 256];
    let n = timeout(Duration::from_millis(timeout_ms), stream.read(&mut buf)).await??;
    let mut line = String::from_utf8_lossy(&buf[..n]).to_string();
    if let Some(idx) = line.find('\n') { line.truncate(idx); }
    let line = line.trim_end().to_string();
    let (product, version) = parse_ssh_ident(&line)
        .ok_or_else(|| anyhow!("not an SSH identification: {:?}", line))?;
    Ok(Banner { protocol: "ssh".into(), port, summary: line, product, version })
}

/// `SSH-2.0-OpenSSH_8.9p1 Ubuntu-3` -> (`OpenSSH`, `8.9p1`).
/// `None` if the line is not an SSH ident.
pub fn parse_ssh_ident(line: &str) -> Option<(Option<String>, Option<String>)> {
    let rest = line.strip_prefix("SSH-")?;
    let (_proto, software) = rest.split_once('-')?;
    let software = software.split_whitespace().next().unwrap_or("");
    if software.is_empty() {
        return Some((None, None));
    }
    Some(match software.split_once('_') {
        Some((p, v)) => (Some(p.to_string()), Some(v.to_string())),
        None => (Some(software.to_string()), None),
    })
}

/// `nginx/1.18.0 (Ubuntu)` -> (`nginx`, `1.18.0`).
pub fn parse_server_header(server: &str) -> (Option<String>, Option<String>) {
    let token = server.split_whitespace().next().unwrap_or("");
    if token.is_empty() {
        return (None, None);
    }
    match token.split_once('/') {
        Some((p, v)) if !v.is_empty() => (Some(p.to_string()), Some(v.to_string())),
        Some((p, _)) => (Some(p.to_string()), None),
        None => (Some(token.to_string()), None),
    }
}

async fn resolve_first(host: &str, port: u16) -> Result<SocketAddr> {
    let mut it = tokio::net::lookup_host((host, port)).await?;
    it.next().ok_or_else(|| anyhow!("failed to resolve: {}", host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn ssh_ident_parsing() {
        assert_eq!(
            parse_ssh_ident("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6"),
            Some((Some("OpenSSH".into()), Some("8.9p1".into())))
        );
        assert_eq!(parse_ssh_ident("SSH-2.0-dropbear"), Some((Some("dropbear".into()), None)));
        assert_eq!(parse_ssh_ident("220 ftp ready"), None);
    }

    #[test]
    fn server_header_parsing() {
        assert_eq!(
            parse_server_header("nginx/1.18.0 (Ubuntu)"),
            (Some("nginx".into()), Some("1.18.0".into()))
        );
        assert_eq!(
            parse_server_header("Microsoft-IIS/10.0"),
            (Some("Microsoft-IIS".into()), Some("10.0".into()))
        );
        assert_eq!(parse_server_header("cloudflare"), (Some("cloudflare".into()), None));
        assert_eq!(parse_server_header(""), (None, None));
    }

    #[tokio::test]
    async fn grabs_ssh_from_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await.unwrap();
        });
        let b = grab_ssh("127.0.0.1", port, 2000).await.unwrap();
        assert_eq!(b.product.as_deref(), Some("OpenSSH"));
        assert_eq!(b.version.as_deref(), Some("9.6"));
    }

    #[tokio::test]
    async fn grabs_http_server_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = s.read(&mut buf).await;
            let reply = b"HTTP/1.0 200 OK\r\nServer: Apache/2.4.58 (Debian)\r\n\r\n";
            s.write_all(reply).await.unwrap();
        });
        let b = grab_http("127.0.0.1", port, 2000).await.unwrap();
        assert_eq!(b.product.as_deref(), Some("Apache"));
        assert_eq!(b.version.as_deref(), Some("2.4.58"));
        assert!(b.summary.starts_with("HTTP/1.0 200 OK"));
    }
}
