//! ClientHello fragmentation for SNI-based DPI bypass.
//!
//! Middleboxes that block on the SNI field reassemble poorly: splitting
//! the TLS ClientHello across many small TCP segments, with the hostname
//! bytes spread over the smallest ones, defeats most stateless inspection.
//!
//! [`FragmentingStream`] wraps an established stream and intercepts only
//! the first write, and only when it carries a TLS handshake record
//! (leading `0x16 0x03`). The record header goes out as its own segment,
//! the region around the SNI extension in tiny chunks, the rest in coarser
//! ones, with a jittered delay between chunks. Every later write passes
//! through untouched, so the bytes on the wire always reassemble to
//! exactly what the TLS stack produced.

use bytes::Bytes;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::rng::RngService;

/// Tunable fragmentation parameters, adjusted at runtime by the adaptive
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSettings {
    /// Chunk size for the SNI region. Valid range 3..=20.
    pub fragment_size: usize,
    /// Nominal inter-chunk delay. Valid range 0..=50 ms.
    pub delay: Duration,
}

impl Default for FragmentSettings {
    fn default() -> Self {
        Self {
            fragment_size: 5,
            delay: Duration::from_millis(2),
        }
    }
}

impl FragmentSettings {
    pub const MIN_FRAGMENT_SIZE: usize = 3;
    pub const MAX_FRAGMENT_SIZE: usize = 20;
    pub const MAX_DELAY: Duration = Duration::from_millis(50);

    /// Clamp both parameters into their valid ranges.
    pub fn clamped(self) -> Self {
        Self {
            fragment_size: self
                .fragment_size
                .clamp(Self::MIN_FRAGMENT_SIZE, Self::MAX_FRAGMENT_SIZE),
            delay: self.delay.min(Self::MAX_DELAY),
        }
    }
}

/// Pending state of a fragmented first write.
enum WriteState {
    /// No fragmentation in progress; writes pass straight through.
    Passthrough,
    /// Mid-plan: remaining segments and the position within them.
    Writing {
        segments: Vec<Bytes>,
        index: usize,
        offset: usize,
        /// Length to report to the caller once the plan completes.
        reported_len: usize,
        /// Inter-chunk delay currently being waited out.
        timer: Option<Pin<Box<Sleep>>>,
    },
}

/// Stream wrapper that fragments the first TLS handshake write.
pub struct FragmentingStream<S> {
    inner: S,
    settings: FragmentSettings,
    rng: Option<Arc<RngService>>,
    /// True until the first write has been observed.
    armed: bool,
    fragments_used: usize,
    state: WriteState,
}

impl<S> FragmentingStream<S> {
    /// Wrap `inner`, fragmenting the first handshake write with `settings`.
    pub fn new(inner: S, settings: FragmentSettings, rng: Arc<RngService>) -> Self {
        Self {
            inner,
            settings: settings.clamped(),
            rng: Some(rng),
            armed: true,
            fragments_used: 0,
            state: WriteState::Passthrough,
        }
    }

    /// Wrap `inner` without fragmenting anything.
    pub fn disabled(inner: S) -> Self {
        Self {
            inner,
            settings: FragmentSettings::default(),
            rng: None,
            armed: false,
            fragments_used: 0,
            state: WriteState::Passthrough,
        }
    }

    /// Number of segments the first write was split into.
    pub fn fragments_used(&self) -> usize {
        self.fragments_used
    }

    /// Active settings (after clamping).
    pub fn settings(&self) -> FragmentSettings {
        self.settings
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Jittered inter-chunk delay: nominal ±30%, floored at 1 ms.
    fn chunk_delay(&self) -> Option<Duration> {
        if self.settings.delay.is_zero() {
            return None;
        }
        let rng = self.rng.as_ref()?;
        let nominal = self.settings.delay.as_micros() as i64;
        let spread = nominal * 3 / 10;
        let offset = if spread > 0 {
            rng.gen_range_i64(-spread, spread + 1)
        } else {
            0
        };
        let micros = (nominal + offset).max(1_000);
        Some(Duration::from_micros(micros as u64))
    }
}

/// True when the buffer opens a TLS handshake record.
fn is_tls_handshake(buf: &[u8]) -> bool {
    buf.len() > 5 && buf[0] == 0x16 && buf[1] == 0x03
}

/// Offset of the first `0x00 0x00` pair in the post-header payload.
///
/// This is the wire encoding of the server_name extension type, searched
/// naively from offset 0. Cipher-suite lists can contain the same pair, so
/// the match may land early; the only consequence is a different split
/// point, never corruption.
pub(crate) fn find_sni_offset(payload: &[u8]) -> Option<usize> {
    if payload.len() < 40 {
        return None;
    }
    payload
        .windows(2)
        .position(|pair| pair == [0x00, 0x00])
}

/// Length of the region split into minimum-size chunks around the SNI.
const SNI_REGION_LEN: usize = 30;

/// Build the segment plan for one ClientHello buffer.
pub(crate) fn fragment_plan(buf: &[u8], settings: FragmentSettings) -> Vec<Bytes> {
    let mut segments = Vec::new();

    // Record header travels alone.
    segments.push(Bytes::copy_from_slice(&buf[..5]));
    let payload = &buf[5..];

    let sni_chunk = settings.fragment_size.clamp(3, 8);
    let coarse_chunk = (settings.fragment_size * 4).max(1);

    let tail = match find_sni_offset(payload) {
        Some(offset) if offset > 0 && offset < payload.len().saturating_sub(10) => {
            segments.push(Bytes::copy_from_slice(&payload[..offset]));
            let region_len = SNI_REGION_LEN.min(payload.len() - offset);
            for chunk in payload[offset..offset + region_len].chunks(sni_chunk) {
                segments.push(Bytes::copy_from_slice(chunk));
            }
            &payload[offset + region_len..]
        }
        _ => payload,
    };

    for chunk in tail.chunks(coarse_chunk) {
        segments.push(Bytes::copy_from_slice(chunk));
    }

    segments
}

impl<S: AsyncRead + Unpin> AsyncRead for FragmentingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for FragmentingStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if matches!(this.state, WriteState::Passthrough) {
            // The wrapper only ever fires on the very first write; later
            // writes must hit the wire byte-identical.
            let fragment = this.armed && is_tls_handshake(buf);
            this.armed = false;

            if !fragment {
                return Pin::new(&mut this.inner).poll_write(cx, buf);
            }

            this.state = WriteState::Writing {
                segments: fragment_plan(buf, this.settings),
                index: 0,
                offset: 0,
                reported_len: buf.len(),
                timer: None,
            };
        }

        this.drive_plan(cx)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<S: AsyncWrite + Unpin> FragmentingStream<S> {
    /// Advance the in-flight segment plan until done, pending, or error.
    fn drive_plan(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let WriteState::Writing {
            segments,
            mut index,
            mut offset,
            reported_len,
            mut timer,
        } = std::mem::replace(&mut self.state, WriteState::Passthrough)
        else {
            return Poll::Ready(Err(io::Error::other("fragment plan missing")));
        };

        loop {
            if let Some(sleep) = timer.as_mut() {
                match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => timer = None,
                    Poll::Pending => {
                        self.state = WriteState::Writing {
                            segments,
                            index,
                            offset,
                            reported_len,
                            timer,
                        };
                        return Poll::Pending;
                    }
                }
            }

            if index >= segments.len() {
                self.fragments_used = segments.len();
                return Poll::Ready(Ok(reported_len));
            }

            let segment = &segments[index];
            match Pin::new(&mut self.inner).poll_write(cx, &segment[offset..]) {
                Poll::Ready(Ok(n)) => {
                    offset += n;
                    if offset >= segment.len() {
                        // Flush so each segment leaves as its own TCP
                        // segment; a pending flush is not worth stalling
                        // the plan over.
                        let _ = Pin::new(&mut self.inner).poll_flush(cx);
                        index += 1;
                        offset = 0;
                        if index < segments.len() {
                            if let Some(delay) = self.chunk_delay() {
                                timer = Some(Box::pin(tokio::time::sleep(delay)));
                            }
                        }
                    }
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {
                    self.state = WriteState::Writing {
                        segments,
                        index,
                        offset,
                        reported_len,
                        timer,
                    };
                    return Poll::Pending;
                }
            }
        }
    }
}
