//! Per-request lifecycle: write the request, read the response head, then
//! its body, under one overall timeout — and decide whether a response
//! should be followed as a redirect.
//!
//! `phase` is tracked as plain state (rather than inferred from control
//! flow) so callers and tests can observe where a request is without
//! threading extra state through the call chain.

use crate::error::{ClientError, Result};
use crate::event::{EventEmitter, RemoveListenerPayload};
use crate::protocol::{read_body, read_head, RequestSpec, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Init,
    Sending,
    RecvHead,
    RecvBody,
    Done,
    Failed,
}

/// Events emitted over a request's lifetime. `Progress` mirrors the
/// connection pool's per-chunk granularity so a caller watching a large
/// download sees the same cadence a direct `read_body` caller would.
#[derive(Debug, Clone)]
pub enum RequestEvent {
    Progress(usize),
    Success,
    Error(String),
    RemoveListener(Option<String>),
}

impl RemoveListenerPayload for RequestEvent {
    fn remove_listener(name: Option<String>) -> Self {
        RequestEvent::RemoveListener(name)
    }
}

/// One outgoing request's state, bound to whichever transport the
/// dispatcher has fetched for it. A `RequestState` is single-use: calling
/// [`execute`](Self::execute) a second time fails with
/// `ClientError::RequestReused`.
pub struct RequestState {
    pub spec: RequestSpec,
    phase: RequestPhase,
    writable: AtomicBool,
    pub redirect_count: u32,
    pub events: Arc<EventEmitter<RequestEvent>>,
}

impl RequestState {
    pub fn new(spec: RequestSpec) -> Self {
        Self {
            spec,
            phase: RequestPhase::Init,
            writable: AtomicBool::new(true),
            redirect_count: 0,
            events: Arc::new(EventEmitter::new()),
        }
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Write the request, read the response, and settle on `Done` or
    /// `Failed`. The whole exchange (not just the body) is bounded by
    /// `timeout_secs`; connect time is the pool's concern, not this one's.
    pub async fn execute<S>(&mut self, io: &mut S, timeout_secs: u64) -> Result<Response>
    where
        S: AsyncBufRead + AsyncWrite + Unpin,
    {
        if !self.writable.swap(false, Ordering::SeqCst) {
            return Err(ClientError::RequestReused);
        }

        match tokio_timeout(Duration::from_secs(timeout_secs), self.drive(io)).await {
            Ok(Ok(resp)) => {
                self.phase = RequestPhase::Done;
                self.events.emit("success", RequestEvent::Success);
                Ok(resp)
            }
            Ok(Err(e)) => {
                self.phase = RequestPhase::Failed;
                self.events
                    .emit("error", RequestEvent::Error(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.phase = RequestPhase::Failed;
                let err = ClientError::ReadTimeout {
                    peer: self.spec.url.host_str().unwrap_or_default().to_string(),
                    secs: timeout_secs,
                };
                self.events
                    .emit("error", RequestEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn drive<S>(&mut self, io: &mut S) -> Result<Response>
    where
        S: AsyncBufRead + AsyncWrite + Unpin,
    {
        self.phase = RequestPhase::Sending;
        trace!(url = %self.spec.url, "sending request");
        self.spec.write_to(io).await.map_err(ClientError::Io)?;

        self.phase = RequestPhase::RecvHead;
        let head = read_head(io).await?;
        debug!(status = head.status, "response head received");

        self.phase = RequestPhase::RecvBody;
        let events = Arc::clone(&self.events);
        let body = read_body(io, head.body_mode, |chunk| {
            events.emit("progress", RequestEvent::Progress(chunk.len()));
        })
        .await?;

        Ok(Response {
            version: head.version,
            status: head.status,
            reason: head.reason,
            headers: head.headers,
            body,
        })
    }

    /// If `response` is a redirect this request should follow, resolve the
    /// `Location` header against the request's own URL and return the
    /// absolute target. Returns `Ok(None)` for any non-redirect response,
    /// and errors with `TooManyRedirects` once `redirect_count` would
    /// exceed `max_redirects`.
    pub fn redirect_target(
        &self,
        response: &Response,
        max_redirects: u32,
    ) -> Result<Option<Url>> {
        if !matches!(response.status, 301..=303 | 307 | 308) {
            return Ok(None);
        }
        let Some(location) = response.headers.get("Location") else {
            return Ok(None);
        };
        if self.redirect_count >= max_redirects {
            return Err(ClientError::TooManyRedirects);
        }
        let target = self
            .spec
            .url
            .join(location)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpVersion;
    use crate::protocol::{Body, Headers, Method};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

    fn spec(url: &str) -> RequestSpec {
        RequestSpec {
            method: Method::Get,
            version: HttpVersion::Http11,
            url: Url::parse(url).unwrap(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    #[tokio::test]
    async fn executes_request_and_reaches_done() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);

        tokio::spawn(async move {
            let mut sent = Vec::new();
            let mut tmp = [0u8; 256];
            loop {
                let n = server.read(&mut tmp).await.unwrap();
                sent.extend_from_slice(&tmp[..n]);
                if sent.ends_with(b"\r\n\r\n") {
                    break;
                }
            }
            server
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let mut state = RequestState::new(spec("http://example.com/"));
        let resp = state.execute(&mut client, 5).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"ok");
        assert_eq!(state.phase(), RequestPhase::Done);
    }

    #[tokio::test]
    async fn second_execute_call_is_rejected() {
        let (client, mut server) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);

        tokio::spawn(async move {
            let mut tmp = [0u8; 256];
            let mut sent = Vec::new();
            loop {
                let n = server.read(&mut tmp).await.unwrap();
                sent.extend_from_slice(&tmp[..n]);
                if sent.ends_with(b"\r\n\r\n") {
                    break;
                }
            }
            server
                .write_all(b"HTTP/1.1 204 No Content\r\n\r\n")
                .await
                .unwrap();
        });

        let mut state = RequestState::new(spec("http://example.com/"));
        state.execute(&mut client, 5).await.unwrap();
        let second = state.execute(&mut client, 5).await;
        assert!(matches!(second, Err(ClientError::RequestReused)));
    }

    #[tokio::test]
    async fn timeout_surfaces_read_timeout_error() {
        let (client, _server) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);
        let mut state = RequestState::new(spec("http://example.com/"));
        let result = state.execute(&mut client, 0).await;
        assert!(matches!(result, Err(ClientError::ReadTimeout { .. })));
        assert_eq!(state.phase(), RequestPhase::Failed);
    }

    #[test]
    fn redirect_target_resolves_relative_location() {
        let req = spec("http://example.com/old");
        let state = RequestState::new(req);
        let mut headers = Headers::new();
        headers.insert("Location", "/new");
        let response = Response {
            version: "1.1".to_string(),
            status: 302,
            reason: "Found".to_string(),
            headers,
            body: Vec::new(),
        };
        let target = state.redirect_target(&response, 5).unwrap().unwrap();
        assert_eq!(target.as_str(), "http://example.com/new");
    }

    #[test]
    fn redirect_target_none_for_2xx() {
        let state = RequestState::new(spec("http://example.com/"));
        let response = Response {
            version: "1.1".to_string(),
            status: 200,
            reason: "OK".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        };
        assert!(state.redirect_target(&response, 5).unwrap().is_none());
    }

    #[test]
    fn redirect_target_errors_past_max() {
        let mut state = RequestState::new(spec("http://example.com/"));
        state.redirect_count = 5;
        let mut headers = Headers::new();
        headers.insert("Location", "/again");
        let response = Response {
            version: "1.1".to_string(),
            status: 301,
            reason: "Moved Permanently".to_string(),
            headers,
            body: Vec::new(),
        };
        assert!(matches!(
            state.redirect_target(&response, 5),
            Err(ClientError::TooManyRedirects)
        ));
    }
}
