//! BoringSSL connector with browser fingerprint selection.
//!
//! Dials TCP, optionally layers the ClientHello fragmenter underneath, and
//! performs a TLS 1.2/1.3 handshake shaped by a [`FingerprintProfile`]:
//! cipher order, curve order, signature schemes, ALPN, GREASE, and
//! extension permutation all follow the chosen browser.

use boring::ssl::{SslConnector, SslMethod, SslSessionCacheMode, SslVerifyMode, SslVersion};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};
use crate::fingerprint::FingerprintProfile;
use crate::rng::RngService;
use crate::transport::fragment::{FragmentSettings, FragmentingStream};
use crate::transport::tcp;

// FFI bindings for BoringSSL extension control
use boring_sys::SSL_CTX;
use std::os::raw::c_int;

extern "C" {
    /// Enable GREASE (Generate Random Extensions And Sustain Extensibility)
    pub fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    /// Enable extension order permutation (Chrome 110+ behavior)
    pub fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
}

/// Timing breakdown of one evasive connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectTimings {
    pub dns_ms: u64,
    pub tcp_ms: u64,
    pub tls_ms: u64,
}

/// TLS connector that impersonates a rotating set of browsers.
pub struct EvasiveConnector {
    /// Pinned profile; `None` rotates through the catalog.
    profile: Option<FingerprintProfile>,
    rotation: AtomicUsize,
    connect_timeout: Duration,
    allow_insecure: bool,
    fragmentation: Option<FragmentSettings>,
    rng: Arc<RngService>,
}

impl EvasiveConnector {
    /// Create a rotating connector with certificate verification on and
    /// fragmentation off.
    pub fn new(connect_timeout: Duration, rng: Arc<RngService>) -> Self {
        Self {
            profile: None,
            rotation: AtomicUsize::new(0),
            connect_timeout,
            allow_insecure: false,
            fragmentation: None,
            rng,
        }
    }

    /// Pin a single fingerprint profile instead of rotating.
    pub fn with_profile(mut self, profile: FingerprintProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Fragment the ClientHello with the given settings.
    pub fn with_fragmentation(mut self, settings: FragmentSettings) -> Self {
        self.fragmentation = Some(settings.clamped());
        self
    }

    /// Disable peer certificate verification. Off by default.
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Profile the next connection will use.
    pub fn next_profile(&self) -> FingerprintProfile {
        match self.profile {
            Some(profile) => profile,
            None => {
                let idx = self.rotation.fetch_add(1, Ordering::Relaxed);
                FingerprintProfile::ALL[idx % FingerprintProfile::ALL.len()]
            }
        }
    }

    fn configure_ssl(&self, profile: FingerprintProfile) -> Result<SslConnector> {
        let fp = profile.tls();
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("Failed to create SSL connector: {e}")))?;

        if !fp.cipher_list.is_empty() {
            let cipher_str = fp.cipher_list.join(":");
            builder
                .set_cipher_list(&cipher_str)
                .map_err(|e| Error::tls(format!("Failed to set cipher list: {e}")))?;
        }

        if !fp.curves.is_empty() {
            let curves_str = fp.curves.join(":");
            builder
                .set_curves_list(&curves_str)
                .map_err(|e| Error::tls(format!("Failed to set curves: {e}")))?;
        }

        if !fp.sigalgs.is_empty() {
            let sigalgs_str = fp.sigalgs.join(":");
            builder
                .set_sigalgs_list(&sigalgs_str)
                .map_err(|e| Error::tls(format!("Failed to set signature algorithms: {e}")))?;
        }

        // Extension permutation matches Chrome 110+ behavior; Firefox
        // permutes but never sends GREASE.
        unsafe {
            let ctx = builder.as_ptr() as *mut SSL_CTX;
            SSL_CTX_set_grease_enabled(ctx, if fp.grease { 1 } else { 0 });
            SSL_CTX_set_permute_extensions(ctx, 1);
        }

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::tls(format!("Failed to set min TLS version: {e}")))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::tls(format!("Failed to set max TLS version: {e}")))?;

        // Browsers resume sessions; offering tickets keeps the handshake
        // surface ordinary.
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);

        builder
            .set_alpn_protos(&alpn_wire_format(&fp.alpn))
            .map_err(|e| Error::tls(format!("Failed to set ALPN: {e}")))?;

        if self.allow_insecure {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(builder.build())
    }

    /// Connect to `address:port` and handshake with `server_name` in the
    /// SNI, using the next profile in rotation.
    ///
    /// The connect timeout covers dial plus handshake. On any failure the
    /// socket is dropped (closed) and the error kind distinguishes
    /// tcp / tls / timeout.
    pub async fn connect(
        &self,
        address: &str,
        port: u16,
        server_name: &str,
    ) -> Result<EvasiveStream> {
        let profile = self.next_profile();
        let deadline = Instant::now() + self.connect_timeout;

        let (tcp_stream, dial) = tcp::connect(address, port, self.connect_timeout).await?;

        let wrapped = match self.fragmentation {
            Some(settings) => FragmentingStream::new(tcp_stream, settings, self.rng.clone()),
            None => FragmentingStream::disabled(tcp_stream),
        };

        let connector = self.configure_ssl(profile)?;
        let mut config = connector
            .configure()
            .map_err(|e| Error::tls(format!("Failed to configure SSL: {e}")))?;
        if self.allow_insecure {
            config.set_verify_hostname(false);
        }

        let tls_start = Instant::now();
        let handshake = tokio_boring::connect(config, server_name, wrapped);
        let stream = tokio::time::timeout(
            deadline.saturating_duration_since(Instant::now()),
            handshake,
        )
        .await
        .map_err(|_| Error::Timeout(self.connect_timeout))?
        .map_err(|e| Error::tls(format!("TLS handshake failed: {e}")))?;

        Ok(EvasiveStream {
            inner: stream,
            profile,
            timings: ConnectTimings {
                dns_ms: dial.dns_ms,
                tcp_ms: dial.tcp_ms,
                tls_ms: tls_start.elapsed().as_millis() as u64,
            },
        })
    }
}

/// Established TLS stream with its fingerprint and timing metadata.
pub struct EvasiveStream {
    inner: SslStream<FragmentingStream<TcpStream>>,
    profile: FingerprintProfile,
    timings: ConnectTimings,
}

impl EvasiveStream {
    /// Fingerprint profile used for the handshake.
    pub fn profile(&self) -> FingerprintProfile {
        self.profile
    }

    /// Connection timing breakdown.
    pub fn timings(&self) -> ConnectTimings {
        self.timings
    }

    /// Number of TCP segments the ClientHello was split into.
    pub fn fragments_used(&self) -> usize {
        self.inner.get_ref().fragments_used()
    }

    /// Negotiated ALPN protocol, if any.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.inner.ssl().selected_alpn_protocol()
    }
}

impl AsyncRead for EvasiveStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for EvasiveStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Encode an ALPN list into the length-prefixed wire format.
fn alpn_wire_format(protocols: &[&str]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(16);
    for proto in protocols {
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    wire
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_wire_format_is_length_prefixed() {
        assert_eq!(alpn_wire_format(&["h2", "http/1.1"]), b"\x02h2\x08http/1.1");
    }

    #[test]
    fn rotation_cycles_the_catalog() {
        let rng = RngService::with_seed(1);
        let connector = EvasiveConnector::new(Duration::from_secs(5), rng);
        let seen: Vec<_> = (0..8).map(|_| connector.next_profile().label()).collect();
        assert_eq!(&seen[..4], &FingerprintProfile::labels());
        assert_eq!(&seen[4..], &FingerprintProfile::labels());
    }

    #[test]
    fn pinned_profile_never_rotates() {
        let rng = RngService::with_seed(2);
        let connector = EvasiveConnector::new(Duration::from_secs(5), rng)
            .with_profile(FingerprintProfile::Safari17);
        for _ in 0..4 {
            assert_eq!(connector.next_profile(), FingerprintProfile::Safari17);
        }
    }
}
