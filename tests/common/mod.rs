#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use port_scan_rs::probe::Prober;
use port_scan_rs::types::{PortResult, PortStatus, Protocol};
use time::OffsetDateTime;

/// Fake prober that never touches the network. Records how many probes ran
/// and the peak number running at once.
#[derive(Debug, Default)]
pub struct RecordingProber {
    pub delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingProber {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Ports divisible by 10 are open, odd ports closed, the rest filtered.
pub fn status_for(port: u16) -> PortStatus {
    if port % 10 == 0 {
        PortStatus::Open
    } else if port % 2 == 1 {
        PortStatus::Closed
    } else {
        PortStatus::Filtered
    }
}

#[async_trait]
impl Prober for RecordingProber {
    async fn probe(
        &self,
        target: &str,
        port: u16,
        protocol: Protocol,
        _timeout: Duration,
    ) -> PortResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let status = status_for(port);
        PortResult {
            ip: target.to_string(),
            port,
            protocol,
            status,
            service: String::new(),
            banner: String::new(),
            scan_time: OffsetDateTime::now_utc(),
            duration_ms: self.delay.as_millis() as u64,
        }
    }
}
