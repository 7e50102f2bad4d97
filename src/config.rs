use std::time::Duration;

/// Hard ceiling on simultaneous in-flight probes.
pub const MAX_CONCURRENCY: usize = 50;
/// Hard ceiling on ports per scan request.
pub const MAX_PORTS: usize = 1000;
/// Per-probe timeout used when the request leaves it unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;
/// Port spec used when the request leaves it empty.
pub const DEFAULT_PORT_SPEC: &str = "22,80,443,3306,3389,8080";
/// Scan target used for container instances without a recorded address.
pub const DEFAULT_INSTANCE_TARGET: &str = "127.0.0.1";

/// Limits applied by the engine to every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLimits {
    pub concurrency: usize,
    pub max_ports: usize,
    pub default_timeout: Duration,
}

impl ScanLimits {
    /// Lower the concurrency cap. Values are clamped into `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            concurrency: MAX_CONCURRENCY,
            max_ports: MAX_PORTS,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}
