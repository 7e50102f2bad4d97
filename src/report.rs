use time::OffsetDateTime;

use crate::types::{PortResult, PortStatus, Protocol, ScanReport};

/// Build the final report once every probe has reported.
///
/// Results are sorted by port so reports are stable. Panics if the result
/// count differs from the number of scheduled ports; the dispatcher
/// guarantees one result per port.
pub fn aggregate(
    target: &str,
    protocol: Protocol,
    ports: &[u16],
    mut results: Vec<PortResult>,
) -> ScanReport {
    assert_eq!(
        results.len(),
        ports.len(),
        "every scheduled port must yield exactly one result"
    );
    results.sort_by_key(|r| r.port);

    ScanReport {
        target: target.to_string(),
        protocol,
        total_ports: ports.len(),
        open_ports: count_open(&results),
        scan_time: OffsetDateTime::now_utc(),
        results,
    }
}

pub fn count_open(results: &[PortResult]) -> usize {
    results
        .iter()
        .filter(|r| r.status == PortStatus::Open)
        .count()
}
