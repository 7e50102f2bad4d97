/// Name reported for ports missing from the table.
pub const UNKNOWN_SERVICE: &str = "unknown";

const WELL_KNOWN: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (443, "https"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "mssql"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (6379, "redis"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (27017, "mongodb"),
];

/// Map a port number to a well-known service name for display.
pub fn service_name(port: u16) -> &'static str {
    WELL_KNOWN
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|idx| WELL_KNOWN[idx].1)
        .unwrap_or(UNKNOWN_SERVICE)
}
