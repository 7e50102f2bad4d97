use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use ::time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{self, TcpStream, UdpSocket};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::services::service_name;
use crate::types::{PortResult, PortStatus, Protocol};

/// Size of the single read used to capture a greeting.
pub const BANNER_READ_BYTES: usize = 1024;
/// Banners longer than this many characters are cut and suffixed with `...`.
pub const BANNER_MAX_CHARS: usize = 200;

/// Probes a single `target:port`. Implementations never fail: every outcome
/// is encoded in the returned result's status.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(
        &self,
        target: &str,
        port: u16,
        protocol: Protocol,
        timeout: Duration,
    ) -> PortResult;
}

/// Real network prober: TCP connect with a passive banner read, or a UDP
/// datagram exchange. One attempt per port, no retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkProber;

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(
        &self,
        target: &str,
        port: u16,
        protocol: Protocol,
        timeout: Duration,
    ) -> PortResult {
        let scan_time = OffsetDateTime::now_utc();
        let start = Instant::now();

        let (status, banner) = match protocol {
            Protocol::Tcp => probe_tcp(target, port, timeout).await,
            Protocol::Udp => probe_udp(target, port, timeout).await,
        };
        let service = match status {
            PortStatus::Open => service_name(port).to_string(),
            _ => String::new(),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(host = %target, port, %protocol, %status, duration_ms, "probe finished");

        PortResult {
            ip: target.to_string(),
            port,
            protocol,
            status,
            service,
            banner,
            scan_time,
            duration_ms,
        }
    }
}

/// Map a failed connect to a port status.
///
/// Best effort: an explicit refusal (RST, or ICMP port-unreachable for UDP)
/// means closed; timeouts, unreachable networks, resets and resolution
/// failures are all reported as filtered.
pub fn classify_connect_error(err: &io::Error) -> PortStatus {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => PortStatus::Closed,
        _ => PortStatus::Filtered,
    }
}

async fn probe_tcp(target: &str, port: u16, timeout: Duration) -> (PortStatus, String) {
    match time::timeout(timeout, TcpStream::connect((target, port))).await {
        Ok(Ok(mut stream)) => {
            let banner = read_banner(&mut stream, timeout).await;
            (PortStatus::Open, banner)
        }
        Ok(Err(e)) => (classify_connect_error(&e), String::new()),
        Err(_) => (PortStatus::Filtered, String::new()),
    }
}

/// Send one empty datagram and wait for a reply. Silence is indistinguishable
/// from a firewall drop, so it is reported as filtered.
async fn probe_udp(target: &str, port: u16, timeout: Duration) -> (PortStatus, String) {
    let exchange = async {
        let addr = net::lookup_host((target, port))
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for target"))?;
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        socket.send(b"").await?;
        let mut buf = [0u8; BANNER_READ_BYTES];
        let n = socket.recv(&mut buf).await?;
        Ok::<_, io::Error>(format_banner(&buf[..n]))
    };

    match time::timeout(timeout, exchange).await {
        Ok(Ok(banner)) => (PortStatus::Open, banner),
        Ok(Err(e)) => (classify_connect_error(&e), String::new()),
        Err(_) => (PortStatus::Filtered, String::new()),
    }
}

/// Single bounded read of whatever the peer sends first. Any failure,
/// including the deadline passing, yields an empty banner.
pub async fn read_banner<R>(reader: &mut R, timeout: Duration) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; BANNER_READ_BYTES];
    match time::timeout(timeout, reader.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => format_banner(&buf[..n]),
        _ => String::new(),
    }
}

/// Lossy-decode, trim, and cap a banner at `BANNER_MAX_CHARS` characters.
pub fn format_banner(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().nth(BANNER_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn banner_is_trimmed() {
        assert_eq!(format_banner(b"  SSH-2.0-OpenSSH_9.6\r\n"), "SSH-2.0-OpenSSH_9.6");
        assert_eq!(format_banner(b"\r\n"), "");
    }

    #[test]
    fn long_banner_is_truncated() {
        let banner = format_banner(&[b'a'; 500]);
        assert_eq!(banner.len(), 203);
        assert!(banner.ends_with("..."));

        let exact = format_banner(&[b'b'; 200]);
        assert_eq!(exact.len(), 200);
        assert!(!exact.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(300);
        let banner = format_banner(text.as_bytes());
        assert_eq!(banner.chars().count(), 203);
    }

    #[test]
    fn refused_is_closed_everything_else_filtered() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_connect_error(&refused), PortStatus::Closed);
        for kind in [
            io::ErrorKind::TimedOut,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::NotFound,
            io::ErrorKind::Other,
        ] {
            assert_eq!(classify_connect_error(&io::Error::from(kind)), PortStatus::Filtered);
        }
    }

    #[tokio::test]
    async fn silent_peer_gives_empty_banner() {
        let (mut client, _server) = tokio::io::duplex(64);
        let banner = read_banner(&mut client, Duration::from_millis(50)).await;
        assert!(banner.is_empty());
    }

    #[tokio::test]
    async fn banner_reads_greeting() {
        let (mut client, mut server) = tokio::io::duplex(2048);
        server.write_all(b"220 mail.example.com ESMTP\r\n").await.unwrap();
        let banner = read_banner(&mut client, Duration::from_secs(1)).await;
        assert_eq!(banner, "220 mail.example.com ESMTP");
    }
}
