//! Response parsing.

use super::chunked::read_chunked_body;
use super::types::{Headers, Response};
use crate::error::{ClientError, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tracing::trace;

const READ_UNTIL_CLOSE_CHUNK: usize = 8192;

async fn read_crlf_line<S: AsyncBufRead + Unpin>(reader: &mut S) -> Result<String> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw).await?;
    if n == 0 {
        return Err(ClientError::ConnectionClosed);
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    String::from_utf8(raw).map_err(|_| ClientError::Protocol("non-utf8 header line".to_string()))
}

/// Validate and parse `HTTP/<version> <status>( <reason>)?` against
/// `^HTTP/\S+ [0-9]{3}( .*|$)`.
fn parse_status_line(line: &str) -> Result<(String, u16, String)> {
    let rest = line
        .strip_prefix("HTTP/")
        .ok_or_else(|| ClientError::Protocol("malformed status line".to_string()))?;

    let mut parts = rest.splitn(2, ' ');
    let version = parts
        .next()
        .filter(|v| !v.is_empty() && !v.contains(char::is_whitespace))
        .ok_or_else(|| ClientError::Protocol("malformed status line".to_string()))?
        .to_string();
    let remainder = parts.next().unwrap_or("");

    let mut remainder_parts = remainder.splitn(2, ' ');
    let status_token = remainder_parts
        .next()
        .ok_or_else(|| ClientError::Protocol("malformed status line".to_string()))?;
    if status_token.len() != 3 || !status_token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ClientError::Protocol("malformed status line".to_string()));
    }
    let status: u16 = status_token
        .parse()
        .map_err(|_| ClientError::Protocol("malformed status line".to_string()))?;
    let reason = remainder_parts.next().unwrap_or("").to_string();

    Ok((version, status, reason))
}

async fn read_headers<S: AsyncBufRead + Unpin>(reader: &mut S) -> Result<Headers> {
    let mut headers = Headers::new();
    loop {
        let line = read_crlf_line(reader).await?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ClientError::Protocol("malformed header line".to_string()))?;
        headers.insert(name.trim(), value.trim());
    }
    Ok(headers)
}

/// The response head: status line plus headers, and the body mode it
/// selects, surfaced so callers (the request state machine) can observe
/// which receive phase they're entering.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body_mode: BodyMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Empty,
    Chunked,
    ContentLength(u64),
    UntilClose,
}

/// Read and validate the status line and headers, then decide the body
/// mode.
pub async fn read_head<S: AsyncBufRead + Unpin>(reader: &mut S) -> Result<ResponseHead> {
    let status_line = read_crlf_line(reader).await?;
    let (version, status, reason) = parse_status_line(&status_line)?;
    let headers = read_headers(reader).await?;

    let content_length: Option<u64> = headers
        .get("Content-Length")
        .and_then(|v| v.trim().parse().ok());
    let is_chunked = headers
        .get("Transfer-Encoding")
        .map(|v| !v.split(',').all(|t| t.trim().eq_ignore_ascii_case("identity")))
        .unwrap_or(false);

    let body_mode = if matches!(status, 100..=199 | 204 | 304) || content_length == Some(0) {
        BodyMode::Empty
    } else if is_chunked {
        BodyMode::Chunked
    } else if let Some(len) = content_length {
        BodyMode::ContentLength(len)
    } else {
        BodyMode::UntilClose
    };

    Ok(ResponseHead {
        version,
        status,
        reason,
        headers,
        body_mode,
    })
}

/// Read the body for a previously-parsed head, in whichever mode it
/// selected. `progress` is invoked once per body chunk read off the wire.
pub async fn read_body<S, F>(reader: &mut S, mode: BodyMode, mut progress: F) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    match mode {
        BodyMode::Empty => {
            trace!("response has no body");
            Ok(Vec::new())
        }
        BodyMode::Chunked => read_chunked_body(reader, &mut progress).await,
        BodyMode::ContentLength(len) => {
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf).await?;
            progress(&buf);
            Ok(buf)
        }
        BodyMode::UntilClose => read_until_close(reader, &mut progress).await,
    }
}

/// Read a full response off `reader`: status line, headers, then body.
/// Convenience wrapper over [`read_head`] + [`read_body`] for callers that
/// don't need to observe the intermediate phase (most tests; see
/// `request_state.rs` for the phase-observing driver).
pub async fn parse_response<S, F>(reader: &mut S, mut progress: F) -> Result<Response>
where
    S: AsyncRead + AsyncBufRead + Unpin,
    F: FnMut(&[u8]),
{
    let head = read_head(reader).await?;
    let body = read_body(reader, head.body_mode, &mut progress).await?;
    Ok(Response {
        version: head.version,
        status: head.status,
        reason: head.reason,
        headers: head.headers,
        body,
    })
}

/// Read-until-close body mode: read until the peer closes the connection,
/// with no `Content-Length` bound. The fallback when a response has
/// neither `Content-Length` nor chunked transfer-encoding.
async fn read_until_close<S, F>(reader: &mut S, progress: &mut F) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let mut body = Vec::new();
    let mut buf = [0u8; READ_UNTIL_CLOSE_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        progress(&buf[..n]);
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}
