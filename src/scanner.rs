use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MAX_CONCURRENCY;
use crate::error::ScanError;
use crate::probe::Prober;
use crate::types::{PortResult, Protocol};

/// Fans ports out to a [`Prober`] under a concurrency cap and fans the
/// results back in.
///
/// - Limits in-flight probes using a `Semaphore` (at most 50 permits).
/// - Each probe bounds itself with its own timeout; there is no cross-port cancellation.
/// - Returns only after every spawned probe has finished, with exactly one
///   result per requested port, in completion order.
#[derive(Clone)]
pub struct Scanner {
    prober: Arc<dyn Prober>,
    concurrency: usize,
}

impl Scanner {
    /// `concurrency` is clamped into `1..=MAX_CONCURRENCY`.
    pub fn new(prober: Arc<dyn Prober>, concurrency: usize) -> Self {
        Self {
            prober,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    /// Probe every port and wait for all of them.
    pub async fn dispatch(
        &self,
        target: &str,
        ports: &[u16],
        protocol: Protocol,
        timeout: Duration,
    ) -> Vec<PortResult> {
        self.dispatch_internal(target, ports, protocol, timeout, None)
            .await
            .expect("scan without a cancellation token cannot be cancelled")
    }

    /// Variant that accepts a `CancellationToken`. Once the token fires, no new
    /// probe is admitted, in-flight probes are aborted and `ScanError::Cancelled`
    /// is returned instead of a partial result list.
    pub async fn dispatch_with_cancel(
        &self,
        target: &str,
        ports: &[u16],
        protocol: Protocol,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<Vec<PortResult>, ScanError> {
        self.dispatch_internal(target, ports, protocol, timeout, Some(cancel))
            .await
    }

    async fn dispatch_internal(
        &self,
        target: &str,
        ports: &[u16],
        protocol: Protocol,
        timeout: Duration,
        cancel_opt: Option<CancellationToken>,
    ) -> Result<Vec<PortResult>, ScanError> {
        let results = Arc::new(Mutex::new(Vec::with_capacity(ports.len())));
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let cancel = cancel_opt.unwrap_or_default();
        let target: Arc<str> = Arc::from(target);

        info!(
            host = %target,
            %protocol,
            ports = ports.len(),
            concurrency = self.concurrency,
            timeout_ms = timeout.as_millis() as u64,
            "scan started"
        );

        for &port in ports {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    info!(host = %target, "scan cancelled while admitting probes");
                    return Err(ScanError::Cancelled);
                }
                permit = sem.clone().acquire_owned() => permit.expect("semaphore is never closed"),
            };
            let prober = self.prober.clone();
            let results = results.clone();
            let target = target.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let _permit = permit; // keep permit until the probe completes

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = prober.probe(&target, port, protocol, timeout) => result,
                };
                results.lock().await.push(result);
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    info!(host = %target, "scan cancelled while waiting for probes");
                    return Err(ScanError::Cancelled);
                }
                joined = set.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Some(Err(e)) => debug!("probe task ended early: {e}"),
                    None => break,
                },
            }
        }

        let results = std::mem::take(&mut *results.lock().await);
        if results.len() != ports.len() && cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        info!(host = %target, results = results.len(), "scan finished");
        Ok(results)
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortStatus;
    use async_trait::async_trait;
    use time::OffsetDateTime;

    struct EvenOpen;

    #[async_trait]
    impl Prober for EvenOpen {
        async fn probe(&self, target: &str, port: u16, protocol: Protocol, _timeout: Duration) -> PortResult {
            PortResult {
                ip: target.to_string(),
                port,
                protocol,
                status: if port % 2 == 0 { PortStatus::Open } else { PortStatus::Closed },
                service: String::new(),
                banner: String::new(),
                scan_time: OffsetDateTime::now_utc(),
                duration_ms: 0,
            }
        }
    }

    #[tokio::test]
    async fn one_result_per_port_including_duplicates() {
        let scanner = Scanner::new(Arc::new(EvenOpen), 4);
        let ports = [1, 2, 2, 3, 4, 5];
        let mut results = scanner
            .dispatch("host", &ports, Protocol::Tcp, Duration::from_secs(1))
            .await;
        assert_eq!(results.len(), ports.len());
        results.sort_by_key(|r| r.port);
        let got: Vec<u16> = results.iter().map(|r| r.port).collect();
        assert_eq!(got, vec![1, 2, 2, 3, 4, 5]);
        assert!(results.iter().all(|r| r.ip == "host"));
    }

    #[tokio::test]
    async fn empty_port_list_returns_immediately() {
        let scanner = Scanner::new(Arc::new(EvenOpen), 50);
        let results = scanner
            .dispatch("host", &[], Protocol::Udp, Duration::from_secs(1))
            .await;
        assert!(results.is_empty());
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(Scanner::new(Arc::new(EvenOpen), 500).concurrency, 50);
        assert_eq!(Scanner::new(Arc::new(EvenOpen), 0).concurrency, 1);
    }
}
