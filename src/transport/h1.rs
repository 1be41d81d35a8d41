//! Minimal HTTP/1.1 probe requests.
//!
//! Probes are single GETs with browser-realistic headers and
//! `Connection: close`; the response is parsed with httparse from raw
//! bytes. `Accept-Encoding: identity` keeps bodies uncompressed so the
//! JSON metadata targets can be read directly.

use bytes::{Bytes, BytesMut};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 64;

/// Maximum probe body size (256KB); metadata replies are tiny.
const MAX_BODY_SIZE: usize = 256 * 1024;

/// Parsed probe response.
#[derive(Debug)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Milliseconds from request flush to the first response byte.
    pub ttfb_ms: u64,
}

impl ProbeResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Status in the accepted probe range [200, 400).
    pub fn is_probe_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Issue a GET over an established stream and read the full response.
///
/// The caller wraps this in its probe deadline; no timeout is applied
/// here.
pub async fn get<S>(stream: &mut S, host: &str, path: &str, user_agent: &str) -> Result<ProbeResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_request(host, path, user_agent);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::http_protocol(format!("Failed to write request: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::http_protocol(format!("Failed to flush request: {e}")))?;

    let sent_at = Instant::now();
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut ttfb_ms = None;

    loop {
        let n = stream
            .read_buf(&mut buf)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to read response: {e}")))?;
        if ttfb_ms.is_none() && !buf.is_empty() {
            ttfb_ms = Some(sent_at.elapsed().as_millis() as u64);
        }
        if n == 0 || buf.len() >= MAX_HEADERS_SIZE {
            break;
        }
        if let Some(response) = try_parse(&mut buf, ttfb_ms.unwrap_or(0))? {
            return finish_body(stream, response, buf).await;
        }
    }

    match try_parse(&mut buf, ttfb_ms.unwrap_or(0))? {
        Some(response) => finish_body(stream, response, buf).await,
        None => Err(Error::http_protocol("Truncated HTTP response".to_string())),
    }
}

fn build_request(host: &str, path: &str, user_agent: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: {user_agent}\r\n\
         Accept: application/json,text/plain,*/*\r\n\
         Accept-Language: en-US,en;q=0.9\r\n\
         Accept-Encoding: identity\r\n\
         Cache-Control: max-age=0\r\n\
         Connection: close\r\n\r\n"
    )
}

/// Partially parsed response plus how much body is expected.
struct ParsedHead {
    status: u16,
    headers: Vec<(String, String)>,
    body_start: usize,
    content_length: Option<usize>,
    ttfb_ms: u64,
}

fn try_parse(buf: &mut BytesMut, ttfb_ms: u64) -> Result<Option<ParsedHead>> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
    let mut response = httparse::Response::new(&mut header_storage);

    match response.parse(buf) {
        Ok(httparse::Status::Complete(body_start)) => {
            let status = response
                .code
                .ok_or_else(|| Error::http_protocol("Missing status code".to_string()))?;
            let headers: Vec<(String, String)> = response
                .headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            let content_length = headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok());
            Ok(Some(ParsedHead {
                status,
                headers,
                body_start,
                content_length,
                ttfb_ms,
            }))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(Error::http_protocol(format!("Malformed response: {e}"))),
    }
}

async fn finish_body<S>(stream: &mut S, head: ParsedHead, buf: BytesMut) -> Result<ProbeResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut body = BytesMut::from(&buf[head.body_start..]);
    let wanted = head.content_length.unwrap_or(MAX_BODY_SIZE).min(MAX_BODY_SIZE);

    while body.len() < wanted {
        let n = stream
            .read_buf(&mut body)
            .await
            .map_err(|e| Error::http_protocol(format!("Failed to read body: {e}")))?;
        if n == 0 {
            break;
        }
    }
    body.truncate(wanted);

    Ok(ProbeResponse {
        status: head.status,
        headers: head.headers,
        body: body.freeze(),
        ttfb_ms: head.ttfb_ms,
    })
}
