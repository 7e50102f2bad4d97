use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ScanError;

/// Transport used to probe a port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ScanError;

    /// Case-insensitive; an empty string means TCP.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(ScanError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Outcome of a single probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
            PortStatus::Filtered => "filtered",
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One probed `host:port` entry. Built once by the task that probed it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub ip: String,
    pub port: u16,
    pub protocol: Protocol,
    pub status: PortStatus,
    /// Well-known service name; empty unless the port is open.
    pub service: String,
    /// At most 200 characters plus a `...` marker; empty when nothing was read.
    pub banner: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scan_time: OffsetDateTime,
    pub duration_ms: u64,
}

/// Final report for one scan request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: String,
    pub protocol: Protocol,
    pub total_ports: usize,
    pub open_ports: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub scan_time: OffsetDateTime,
    pub results: Vec<PortResult>,
}

/// Report for a scan of a registered container instance's mapped ports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstanceScanReport {
    pub container_id: u32,
    pub container_name: String,
    #[serde(flatten)]
    pub report: ScanReport,
}

/// Scan request as it arrives on the wire, before validation.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanRequest {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Seconds; zero, negative or missing means the default.
    #[serde(default)]
    pub timeout: Option<i64>,
}
