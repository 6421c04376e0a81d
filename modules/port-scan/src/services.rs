//! Conventional service names for well-known TCP ports (nmap-services naming).

const TABLE: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "domain"),
    (80, "http"),
    (110, "pop3"),
    (111, "rpcbind"),
    (123, "ntp"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (389, "ldap"),
    (443, "https"),
    (445, "microsoft-ds"),
    (465, "smtps"),
    (587, "submission"),
    (636, "ldapssl"),
    (993, "imaps"),
    (995, "pop3s"),
    (1080, "socks"),
    (1433, "ms-sql-s"),
    (1521, "oracle"),
    (1723, "pptp"),
    (2049, "nfs"),
    (2375, "docker"),
    (3128, "squid-http"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (5985, "wsman"),
    (6379, "redis"),
    (8000, "http-alt"),
    (8080, "http-proxy"),
    (8443, "https-alt"),
    (11211, "memcache"),
    (27017, "mongod"),
];

/// Service name for `port`, or `"unknown"`.
pub fn service_name(port: u16) -> &'static str {
    TABLE
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|i| TABLE[i].1)
        .unwrap_or("unknown")
}

/// Which banner grabber, if any, understands this service.
pub(crate) fn banner_kind(name: &str) -> Option<BannerKind> {
    match name {
        "ssh" => Some(BannerKind::Ssh),
        "http" | "http-alt" | "http-proxy" => Some(BannerKind::Http),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BannerKind {
    Ssh,
    Http,
}
