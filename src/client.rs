//! Dispatcher facade: `request`/`get`/`post`, origin parsing, queue+pool
//! pairing, redirect handling, connection recycling.
//!
//! `request` is the suspension point — it pushes a task and awaits a
//! oneshot that's carried through any redirect hops, while a weakly-held
//! listener on the pool's `idle` event re-enters `process` whenever a slot
//! frees up for that origin.

use crate::config::{AllowRedirects, HttpVersion, PoolConfig};
use crate::error::{ClientError, Result};
use crate::origin::Origin;
use crate::pool::connection::PooledConnection;
use crate::pool::{ConnectionPool, PoolEvent};
use crate::protocol::{Body, Headers, Method, RequestSpec, Response};
use crate::queue::OriginQueue;
use crate::request_state::{RequestEvent, RequestState};
use crate::tls::TlsContext;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::io::BufReader;
use tokio::sync::oneshot;
use tracing::warn;
use url::Url;

/// Per-request option bag. Success/failure collapse into `request`'s
/// return value; `progress` survives as an optional callback since a
/// caller may want per-chunk notification without waiting for the whole
/// body.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub version: HttpVersion,
    pub headers: Headers,
    pub data: Body,
    pub query: Vec<(String, String)>,
    pub context: HashMap<String, serde_json::Value>,
    pub allow_redirects: AllowRedirects,
    pub progress: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

/// One queued request: the resolved URL, its options, how many redirects
/// it has already followed, and the channel its final outcome is delivered
/// on — carried forward unchanged across redirect hops so the original
/// caller of `request` always receives the terminal response or error.
struct Task {
    url: Url,
    options: RequestOptions,
    redirect_count: u32,
    reply: oneshot::Sender<Result<Response>>,
}

struct ClientInner {
    pool: Arc<ConnectionPool>,
    queue: OriginQueue<Task>,
    tls: Option<TlsContext>,
}

/// The dispatcher. Cheap to clone — it's a thin handle around an `Arc`.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl Client {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_tls(config, None)
    }

    pub fn with_tls(config: PoolConfig, tls: Option<TlsContext>) -> Self {
        let pool = ConnectionPool::new(config);
        let inner = Arc::new(ClientInner {
            pool: Arc::clone(&pool),
            queue: OriginQueue::new(),
            tls,
        });

        // Weak, so the pool's listener doesn't keep this client alive forever.
        let weak: Weak<ClientInner> = Arc::downgrade(&inner);
        pool.events().on("idle", move |event| {
            if let PoolEvent::Idle(origin) = event {
                if let Some(inner) = weak.upgrade() {
                    let client = Client(inner);
                    tokio::spawn(async move { client.process(origin).await });
                }
            }
        });

        Client(inner)
    }

    pub async fn get(&self, url: &str, headers: Headers) -> Result<Response> {
        self.request(
            url,
            RequestOptions {
                method: Method::Get,
                headers,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn post(&self, url: &str, data: Body, headers: Headers) -> Result<Response> {
        self.request(
            url,
            RequestOptions {
                method: Method::Post,
                data,
                headers,
                ..Default::default()
            },
        )
        .await
    }

    /// Submit one request and await its terminal outcome.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Response> {
        let url = Url::parse(url).map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        let origin = Origin::from_url(&url)?;

        let (reply, outcome) = oneshot::channel();
        let task = Task {
            url,
            options,
            redirect_count: 0,
            reply,
        };
        self.0.queue.push_back(origin.clone(), task);
        self.process(origin).await;

        outcome.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Drain `origin`'s queue as far as current admission allows.
    /// Re-entered synchronously after a push, and asynchronously whenever
    /// the pool frees a slot for this origin.
    async fn process(&self, origin: Origin) {
        loop {
            if self.0.queue.is_empty(&origin) {
                return;
            }

            let conn = match self.0.pool.fetch(&origin, self.0.tls.as_ref()).await {
                Ok(Some(conn)) => conn,
                Ok(None) => return, // admission denied; re-woken by `idle`
                Err(e) => {
                    if let Some(task) = self.0.queue.pop_front(&origin) {
                        let _ = task.reply.send(Err(e));
                    }
                    continue;
                }
            };

            let Some(task) = self.0.queue.pop_front(&origin) else {
                // Lost a race to another `process` call for this origin;
                // hand the connection back unopened.
                self.0.pool.recycle(conn, true);
                return;
            };

            let client = self.clone();
            tokio::spawn(async move { client.run_task(conn, task).await });
        }
    }

    async fn run_task(&self, mut conn: PooledConnection, task: Task) {
        let Task {
            url,
            options,
            redirect_count,
            reply,
        } = task;

        let spec = build_request_spec(&url, &options);
        let version = spec.version;
        let request_headers = spec.headers.clone();

        let mut state = RequestState::new(spec);
        state.redirect_count = redirect_count;
        if let Some(progress) = options.progress.clone() {
            state.events.on("progress", move |event| {
                if let RequestEvent::Progress(len) = event {
                    progress(len);
                }
            });
        }

        let timeout_secs = self.0.pool.config().timeout;
        let outcome = {
            let mut io = BufReader::new(&mut conn.transport);
            state.execute(&mut io, timeout_secs).await
        };

        match outcome {
            Err(e) => {
                // A failed connection is never kept alive, but recycle still
                // runs so admission is released and `idle` fires, re-driving
                // `process` for anything queued behind this task's origin.
                self.0.pool.recycle(conn, false);
                let _ = reply.send(Err(e));
            }
            Ok(response) => match state.redirect_target(&response, options.allow_redirects.max) {
                Ok(Some(target)) => {
                    self.0
                        .pool
                        .recycle(conn, should_recycle(version, &request_headers, &response));
                    self.follow_redirect(target, options, state.redirect_count + 1, reply)
                        .await;
                }
                Ok(None) => {
                    self.0
                        .pool
                        .recycle(conn, should_recycle(version, &request_headers, &response));
                    let _ = reply.send(Ok(response));
                }
                Err(e) => {
                    self.0.pool.recycle(conn, false);
                    let _ = reply.send(Err(e));
                }
            },
        }
    }

    async fn follow_redirect(
        &self,
        target: Url,
        options: RequestOptions,
        redirect_count: u32,
        reply: oneshot::Sender<Result<Response>>,
    ) {
        let origin = match Origin::from_url(&target) {
            Ok(origin) => origin,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let task = Task {
            url: target,
            options,
            redirect_count,
            reply,
        };
        self.0.queue.push_front(origin.clone(), task);
        self.process(origin).await;
    }
}

/// Fold the option bag's overrides onto the base URL: data goes onto the
/// wire as a body for the methods that carry one, and as query
/// parameters otherwise.
fn build_request_spec(url: &Url, options: &RequestOptions) -> RequestSpec {
    let carries_body = options.method.carries_request_body() && !is_empty_body(&options.data);

    let (body, query) = if carries_body {
        (options.data.clone(), options.query.clone())
    } else {
        let mut query = data_as_query_pairs(&options.data);
        query.extend(options.query.iter().cloned());
        (Body::Empty, query)
    };

    RequestSpec {
        method: options.method.clone(),
        version: options.version,
        url: url.clone(),
        headers: options.headers.clone(),
        body,
    }
    .with_query(&query)
}

fn is_empty_body(body: &Body) -> bool {
    match body {
        Body::Empty => true,
        Body::Raw(b) => b.is_empty(),
        Body::Form(f) => f.is_empty(),
        Body::Multipart(parts) => parts.is_empty(),
    }
}

fn data_as_query_pairs(data: &Body) -> Vec<(String, String)> {
    match data {
        Body::Form(pairs) => pairs.clone(),
        Body::Empty => Vec::new(),
        _ => {
            warn!("non-form data ignored for a request whose method carries no body");
            Vec::new()
        }
    }
}

/// Reuse only for HTTP/1.1 with `Connection: keep-alive` (or its absence,
/// which this crate's request serialisation already fills in) on both
/// sides; an explicit `Connection: close` on either side always closes.
fn should_recycle(version: HttpVersion, request_headers: &Headers, response: &Response) -> bool {
    version == HttpVersion::Http11
        && !request_headers.has_token("Connection", "close")
        && !response.headers.has_token("Connection", "close")
}
