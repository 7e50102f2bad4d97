use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ScanLimits, DEFAULT_INSTANCE_TARGET, DEFAULT_PORT_SPEC};
use crate::error::ScanError;
use crate::ports::{check_port_count, parse_ports_str};
use crate::probe::{NetworkProber, Prober};
use crate::report::aggregate;
use crate::scanner::Scanner;
use crate::store::InstanceStore;
use crate::types::{InstanceScanReport, Protocol, ScanReport, ScanRequest};

/// A validated scan request. Building one performs no network activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    pub target: String,
    pub ports: Vec<u16>,
    pub protocol: Protocol,
    pub timeout: Duration,
}

/// Entry points used by the HTTP layer and the CLI: validation, scanning,
/// container-instance scanning and (empty) history.
#[derive(Debug, Clone)]
pub struct PortScanEngine {
    scanner: Scanner,
    store: InstanceStore,
    limits: ScanLimits,
}

impl PortScanEngine {
    pub fn new(prober: Arc<dyn Prober>, store: InstanceStore, limits: ScanLimits) -> Self {
        Self {
            scanner: Scanner::new(prober, limits.concurrency),
            store,
            limits,
        }
    }

    /// Engine probing the real network with default limits.
    pub fn with_network(store: InstanceStore) -> Self {
        Self::new(Arc::new(NetworkProber), store, ScanLimits::default())
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    /// Apply defaults and validate. Fails fast on an empty target, an unknown
    /// protocol, a malformed port spec or too many ports.
    pub fn plan(&self, req: &ScanRequest) -> Result<ScanPlan, ScanError> {
        let target = req.target.trim();
        if target.is_empty() {
            return Err(ScanError::EmptyTarget);
        }
        let protocol: Protocol = req.protocol.as_deref().unwrap_or_default().parse()?;
        let spec = match req.ports.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => DEFAULT_PORT_SPEC,
        };
        let ports = parse_ports_str(spec)?;
        check_port_count(&ports, self.limits.max_ports)?;
        let timeout = match req.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs.unsigned_abs()),
            _ => self.limits.default_timeout,
        };

        Ok(ScanPlan {
            target: target.to_string(),
            ports,
            protocol,
            timeout,
        })
    }

    pub async fn scan(&self, req: &ScanRequest) -> Result<ScanReport, ScanError> {
        self.scan_with_cancel(req, CancellationToken::new()).await
    }

    /// Validate, then scan. A fired token aborts the scan with `ScanError::Cancelled`.
    pub async fn scan_with_cancel(
        &self,
        req: &ScanRequest,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let plan = self.plan(req).inspect_err(|e| warn!("rejected scan request: {e}"))?;
        self.run_plan(&plan, cancel).await
    }

    pub async fn run_plan(
        &self,
        plan: &ScanPlan,
        cancel: CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let results = self
            .scanner
            .dispatch_with_cancel(&plan.target, &plan.ports, plan.protocol, plan.timeout, cancel)
            .await?;
        let report = aggregate(&plan.target, plan.protocol, &plan.ports, results);
        info!(
            host = %report.target,
            total = report.total_ports,
            open = report.open_ports,
            "scan report ready"
        );
        Ok(report)
    }

    /// Scan the host ports mapped by a registered container instance over TCP.
    pub async fn scan_instance(
        &self,
        id: u32,
        cancel: CancellationToken,
    ) -> Result<InstanceScanReport, ScanError> {
        let instance = self
            .store
            .get(id)
            .await
            .ok_or(ScanError::InstanceNotFound(id))?;
        if instance.port_mappings.is_empty() {
            return Err(ScanError::NoPortMappings(id));
        }

        let target = match instance.honeypot_ip.trim() {
            "" => DEFAULT_INSTANCE_TARGET.to_string(),
            ip => ip.to_string(),
        };
        let mut ports = parse_ports_str(&instance.host_port_spec())?;
        ports.sort_unstable();
        check_port_count(&ports, self.limits.max_ports)?;

        let plan = ScanPlan {
            target,
            ports,
            protocol: Protocol::Tcp,
            timeout: self.limits.default_timeout,
        };
        let report = self.run_plan(&plan, cancel).await?;

        Ok(InstanceScanReport {
            container_id: instance.id,
            container_name: instance.container_name,
            report,
        })
    }

    /// Past scans are not persisted; always empty.
    pub fn history(&self) -> Vec<ScanReport> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PortScanEngine {
        PortScanEngine::with_network(InstanceStore::new())
    }

    fn request(target: &str, ports: Option<&str>) -> ScanRequest {
        ScanRequest {
            target: target.into(),
            ports: ports.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn plan_applies_defaults() {
        let plan = engine().plan(&request(" 10.0.0.1 ", None)).unwrap();
        assert_eq!(plan.target, "10.0.0.1");
        assert_eq!(plan.ports, vec![22, 80, 443, 3306, 3389, 8080]);
        assert_eq!(plan.protocol, Protocol::Tcp);
        assert_eq!(plan.timeout, Duration::from_secs(3));
    }

    #[test]
    fn non_positive_timeout_means_default() {
        let mut req = request("h", Some("80"));
        req.timeout = Some(0);
        assert_eq!(engine().plan(&req).unwrap().timeout, Duration::from_secs(3));
        req.timeout = Some(-5);
        assert_eq!(engine().plan(&req).unwrap().timeout, Duration::from_secs(3));
        req.timeout = Some(7);
        assert_eq!(engine().plan(&req).unwrap().timeout, Duration::from_secs(7));
    }

    #[test]
    fn plan_rejects_bad_input() {
        let e = engine();
        assert_eq!(e.plan(&request("  ", None)), Err(ScanError::EmptyTarget));
        assert!(matches!(
            e.plan(&request("h", Some("1-1001"))),
            Err(ScanError::TooManyPorts { count: 1001, max: 1000 })
        ));
        assert!(matches!(
            e.plan(&request("h", Some("22,abc"))),
            Err(ScanError::InvalidPort { .. })
        ));
        let mut req = request("h", None);
        req.protocol = Some("icmp".into());
        assert!(matches!(e.plan(&req), Err(ScanError::UnsupportedProtocol(_))));
    }

    #[test]
    fn history_is_empty() {
        assert!(engine().history().is_empty());
    }
}
