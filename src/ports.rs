use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::error::ScanError;

/// Parse a comma-separated port spec into a list of TCP/UDP ports (1..=65535).
///
/// Supported tokens:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
///
/// Tokens are trimmed. Parsing is all-or-nothing: the first bad token fails
/// the whole spec. Duplicates are kept in the order they appear.
pub fn parse_ports_str(spec: &str) -> Result<Vec<u16>, ScanError> {
    let mut out: Vec<u16> = Vec::new();

    for raw in spec.split(',') {
        let token = raw.trim();

        if let Some((a, b)) = token.split_once('-') {
            let range_err = |reason: String| ScanError::InvalidRange {
                token: token.to_string(),
                reason,
            };
            let start = parse_port_number(a.trim())
                .map_err(|e| range_err(format!("invalid start `{}`: {e}", a.trim())))?;
            let end = parse_port_number(b.trim())
                .map_err(|e| range_err(format!("invalid end `{}`: {e}", b.trim())))?;
            if start > end {
                return Err(range_err(format!("start {start} is greater than end {end}")));
            }
            out.extend(start..=end);
            continue;
        }

        let port = parse_port_number(token).map_err(|reason| ScanError::InvalidPort {
            token: token.to_string(),
            reason,
        })?;
        out.push(port);
    }

    Ok(out)
}

/// Reject a port list longer than `max` before any probe is started.
pub fn check_port_count(ports: &[u16], max: usize) -> Result<(), ScanError> {
    if ports.len() > max {
        return Err(ScanError::TooManyPorts {
            count: ports.len(),
            max,
        });
    }
    Ok(())
}

/// Load a port spec from a file. Every line may hold a comma list; `#` starts
/// a comment and blank lines are ignored.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    let spec = content
        .lines()
        .filter_map(|line| {
            let line = line.split('#').next().unwrap_or("").trim().trim_matches(',');
            (!line.is_empty()).then_some(line)
        })
        .collect::<Vec<_>>()
        .join(",");
    parse_ports_str(&spec)
        .with_context(|| format!("invalid ports file: {}", path.as_ref().display()))
}

fn parse_port_number(s: &str) -> Result<u16, String> {
    if s.is_empty() {
        return Err("empty value".to_string());
    }
    let val: u32 = s.parse::<u32>().map_err(|e| format!("not a port number ({e})"))?;
    if val == 0 || val > 65535 {
        return Err(format!("port out of range: {val} (expected 1-65535)"));
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PORT_SPEC;

    #[test]
    fn parse_single_ports() {
        let ports = parse_ports_str("22,80,443").unwrap();
        assert_eq!(ports, vec![22, 80, 443]);
    }

    #[test]
    fn parse_ranges_and_trim() {
        assert_eq!(parse_ports_str("1-3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ports_str(" 1 - 3 , 22 ").unwrap(), vec![1, 2, 3, 22]);
    }

    #[test]
    fn duplicates_are_kept() {
        assert_eq!(parse_ports_str("80,79-81").unwrap(), vec![80, 79, 80, 81]);
    }

    #[test]
    fn invalid_values_error() {
        for spec in ["0", "70000", "5-2", "abc", "22,,80", "1-2-3", "-5", "0-10", "65530-65536"] {
            assert!(parse_ports_str(spec).is_err(), "{spec} should be rejected");
        }
    }

    #[test]
    fn error_names_offending_token() {
        let err = parse_ports_str("22, abc ,80").unwrap_err();
        assert!(err.to_string().contains("`abc`"), "{err}");
        let err = parse_ports_str("5-2").unwrap_err();
        assert!(matches!(err, ScanError::InvalidRange { ref token, .. } if token == "5-2"));
    }

    #[test]
    fn full_range_edges() {
        assert_eq!(parse_ports_str("65535").unwrap(), vec![65535]);
        assert_eq!(parse_ports_str("1-1").unwrap(), vec![1]);
    }

    #[test]
    fn port_cap() {
        let ports = parse_ports_str("1-1000").unwrap();
        assert!(check_port_count(&ports, 1000).is_ok());
        let ports = parse_ports_str("1-1001").unwrap();
        assert_eq!(
            check_port_count(&ports, 1000),
            Err(ScanError::TooManyPorts { count: 1001, max: 1000 })
        );
    }

    #[test]
    fn default_spec_parses() {
        assert_eq!(
            parse_ports_str(DEFAULT_PORT_SPEC).unwrap(),
            vec![22, 80, 443, 3306, 3389, 8080]
        );
    }
}
