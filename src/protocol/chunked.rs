//! Chunked transfer-coding decoder (RFC 7230 §4.1), including chunk
//! extensions, which are parsed and discarded, and the 1024-byte upper
//! bound on a chunk-size line.

use crate::error::{ClientError, Result};
use smallvec::SmallVec;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

const MAX_CHUNK_SIZE_LINE: usize = 1024;

/// Most chunk-size lines (a handful of hex digits, maybe an extension) fit
/// comfortably under this without spilling to the heap.
const CHUNK_SIZE_LINE_INLINE: usize = 32;

/// Read one chunk-size line (up to the terminating `\r\n`), bounded to
/// `MAX_CHUNK_SIZE_LINE` raw bytes. Exceeding the bound without finding a
/// line terminator is a protocol error ("bad chunked length").
async fn read_chunk_size_line<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String> {
    let mut buf: SmallVec<[u8; CHUNK_SIZE_LINE_INLINE]> = SmallVec::new();
    loop {
        if buf.len() >= MAX_CHUNK_SIZE_LINE {
            return Err(ClientError::Protocol("bad chunked length".to_string()));
        }
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            break;
        }
        buf.push(byte);
    }
    String::from_utf8(buf.into_vec())
        .map_err(|_| ClientError::Protocol("bad chunked length".to_string()))
}

/// Parse a chunk-size line, stripping `;`-delimited chunk extensions
/// (ignored) before parsing the hex length.
fn parse_chunk_size(line: &str) -> Result<u64> {
    let token = line.split(';').next().unwrap_or("").trim();
    if token.is_empty() {
        return Err(ClientError::Protocol("bad chunked length".to_string()));
    }
    u64::from_str_radix(token, 16)
        .map_err(|_| ClientError::Protocol("bad chunked length".to_string()))
}

/// Decode a full chunked body from `stream`, invoking `on_chunk` with each
/// appended slice as it arrives. Returns the fully reassembled body.
pub async fn read_chunked_body<S, F>(stream: &mut S, mut on_chunk: F) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let mut body = Vec::new();
    loop {
        let size_line = read_chunk_size_line(stream).await?;
        let size = parse_chunk_size(&size_line)?;

        if size == 0 {
            // Consume (and discard) any trailer headers up to the final
            // blank line.
            loop {
                let trailer = read_chunk_size_line(stream).await?;
                if trailer.is_empty() {
                    break;
                }
            }
            trace!(total = body.len(), "chunked body complete");
            return Ok(body);
        }

        let mut chunk = vec![0u8; size as usize];
        stream.read_exact(&mut chunk).await?;

        // Trailing CRLF after the chunk data.
        let mut crlf = [0u8; 2];
        stream.read_exact(&mut crlf).await?;
        if &crlf != b"\r\n" {
            return Err(ClientError::Protocol(
                "malformed chunk terminator".to_string(),
            ));
        }

        trace!(len = chunk.len(), "decoded chunk");
        on_chunk(&chunk);
        body.extend_from_slice(&chunk);
    }
}
