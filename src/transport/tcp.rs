//! TCP dialing for probe connections.
//!
//! Sockets are configured the way a long-lived browser connection would
//! look: keepalive on a 30 s cadence, Nagle disabled. Disabling Nagle also
//! matters for the fragmenting wrapper, which relies on small writes
//! leaving the host as separate segments.

use socket2::{SockRef, TcpKeepalive};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};

use crate::error::{Error, Result};

/// Timing breakdown of one dial.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialTimings {
    /// DNS resolution time. Zero when the address is a literal IP.
    pub dns_ms: u64,
    /// TCP connect time.
    pub tcp_ms: u64,
}

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Dial `host:port` within `timeout`, covering resolution and connect.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<(TcpStream, DialTimings)> {
    let deadline = Instant::now() + timeout;
    let mut timings = DialTimings::default();

    let addr: SocketAddr = if let Ok(ip) = host.parse::<IpAddr>() {
        SocketAddr::new(ip, port)
    } else {
        let dns_start = Instant::now();
        let resolved = tokio::time::timeout(
            deadline.saturating_duration_since(Instant::now()),
            lookup_host((host, port)),
        )
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(|e| Error::connection(format!("DNS resolution failed for {host}: {e}")))?
        .next()
        .ok_or_else(|| Error::connection(format!("No addresses found for {host}")))?;
        timings.dns_ms = dns_start.elapsed().as_millis() as u64;
        resolved
    };

    let tcp_start = Instant::now();
    let stream = tokio::time::timeout(
        deadline.saturating_duration_since(Instant::now()),
        TcpStream::connect(addr),
    )
    .await
    .map_err(|_| Error::Timeout(timeout))?
    .map_err(|e| Error::connection(format!("Failed to connect to {addr}: {e}")))?;
    timings.tcp_ms = tcp_start.elapsed().as_millis() as u64;

    stream
        .set_nodelay(true)
        .map_err(|e| Error::connection(format!("Failed to set TCP_NODELAY: {e}")))?;

    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_INTERVAL);
    SockRef::from(&stream)
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::connection(format!("Failed to set keepalive: {e}")))?;

    Ok((stream, timings))
}
