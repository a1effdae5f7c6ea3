pub mod connection;

use crate::config::PoolConfig;
use crate::error::{ClientError, Result};
use crate::event::{EventEmitter, RemoveListenerPayload};
use crate::origin::{Origin, Scheme};
use crate::tls::TlsContext;
use connection::{ConnState, PooledConnection, Transport};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Payload emitted on the pool's `"idle"` event: the origin whose idle set
/// just gained (or was denied) a connection, so the dispatcher knows which
/// queue to revisit.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Idle(Origin),
    RemoveListener(Option<String>),
}

impl RemoveListenerPayload for PoolEvent {
    fn remove_listener(name: Option<String>) -> Self {
        PoolEvent::RemoveListener(name)
    }
}

/// Connection pool: per-origin idle/in-use bookkeeping, admission control,
/// and the keepalive sweep.
///
/// Idle connections live in `idle`, keyed by origin. In-use admission is
/// tracked as a per-origin counter (`using_counts`) rather than a registry
/// of live connections — see DESIGN.md for why the background sweep only
/// touches idle connections.
pub struct ConnectionPool {
    config: PoolConfig,
    idle: Arc<DashMap<Origin, Vec<PooledConnection>>>,
    using_counts: Arc<DashMap<Origin, AtomicUsize>>,
    events: Arc<EventEmitter<PoolEvent>>,
    sweep_running: Arc<AtomicBool>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            idle: Arc::new(DashMap::new()),
            using_counts: Arc::new(DashMap::new()),
            events: Arc::new(EventEmitter::new()),
            sweep_running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn events(&self) -> &EventEmitter<PoolEvent> {
        &self.events
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns a usable connection for `origin`, or `None` if admission is
    /// blocked (`|using[origin]| >= max_conn_per_addr`). Ensures the
    /// keepalive sweep is running.
    pub async fn fetch(
        self: &Arc<Self>,
        origin: &Origin,
        tls: Option<&TlsContext>,
    ) -> Result<Option<PooledConnection>> {
        self.ensure_sweep_running();

        if !self.admit(origin) {
            trace!(%origin, "pool admission denied, at max_conn_per_addr");
            return Ok(None);
        }

        if let Some(mut conn) = self.try_take_idle(origin) {
            conn.mark_handed_out();
            debug!(%origin, "reusing pooled connection");
            return Ok(Some(conn));
        }

        match self.dial(origin, tls).await {
            Ok(mut conn) => {
                conn.mark_handed_out();
                Ok(Some(conn))
            }
            Err(e) => {
                self.release_admission(origin);
                Err(e)
            }
        }
    }

    /// Returns `true` if a slot was admitted (i.e. `using[origin]` was
    /// incremented).
    fn admit(&self, origin: &Origin) -> bool {
        let counter = self
            .using_counts
            .entry(origin.clone())
            .or_insert_with(|| AtomicUsize::new(0));
        loop {
            let current = counter.load(Ordering::Relaxed);
            if current >= self.config.max_conn_per_addr {
                return false;
            }
            if counter
                .compare_exchange(current, current + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release_admission(&self, origin: &Origin) {
        if let Some(counter) = self.using_counts.get(origin) {
            counter.fetch_sub(1, Ordering::Relaxed);
        }
        self.maybe_remove_origin(origin);
    }

    fn try_take_idle(&self, origin: &Origin) -> Option<PooledConnection> {
        let mut bucket = self.idle.get_mut(origin)?;
        let idle_timeout = Duration::from_secs(self.config.keepalive_timeout);
        let mut found = None;
        while let Some(conn) = bucket.pop() {
            if conn.is_idle_expired(idle_timeout) {
                trace!(%origin, "discarding expired idle connection");
                continue;
            }
            found = Some(conn);
            break;
        }
        if bucket.is_empty() {
            drop(bucket);
            self.idle.remove(origin);
        }
        found
    }

    async fn dial(&self, origin: &Origin, tls: Option<&TlsContext>) -> Result<PooledConnection> {
        let connect_timeout = Duration::from_secs(self.config.connect_timeout);
        let peer = format!("{}:{}", origin.host, origin.port);

        let tcp = match timeout(connect_timeout, TcpStream::connect((origin.host.as_str(), origin.port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::Io(e)),
            Err(_) => {
                warn!(%origin, "connect timed out");
                return Err(ClientError::ConnectTimeout {
                    peer,
                    secs: self.config.connect_timeout,
                });
            }
        };

        let transport = if origin.scheme == Scheme::Https {
            let ctx = tls.cloned().unwrap_or_default();
            let server_name = rustls::pki_types::ServerName::try_from(origin.host.clone())
                .map_err(|e| ClientError::Tls(e.to_string()))?;
            let connector = tokio_rustls::TlsConnector::from(ctx.config);
            let tls_stream = match timeout(connect_timeout, connector.connect(server_name, tcp)).await {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => return Err(ClientError::Tls(e.to_string())),
                Err(_) => {
                    return Err(ClientError::ConnectTimeout {
                        peer,
                        secs: self.config.connect_timeout,
                    })
                }
            };
            Transport::Tls(Box::new(tls_stream))
        } else {
            Transport::Plain(tcp)
        };

        Ok(PooledConnection::new(origin.clone(), transport))
    }

    /// Return a connection to the pool.
    ///
    /// `keep_alive` is the dispatcher's decision of whether both sides
    /// negotiated HTTP/1.1 keep-alive. Always emits `idle(origin)`.
    pub fn recycle(&self, mut connection: PooledConnection, keep_alive: bool) {
        let origin = connection.origin.clone();
        self.release_admission(&origin);

        if keep_alive && connection.state == ConnState::Established {
            connection.mark_idle();
            self.idle.entry(origin.clone()).or_default().push(connection);
        } else {
            connection.state = ConnState::Closed;
            drop(connection);
        }

        self.events.emit("idle", PoolEvent::Idle(origin));
    }

    /// Remove a connection's admission slot without touching its socket
    /// (the caller retains ownership of `connection`).
    pub fn forget(&self, origin: &Origin) {
        self.release_admission(origin);
    }

    fn maybe_remove_origin(&self, origin: &Origin) {
        let using_empty = self
            .using_counts
            .get(origin)
            .map(|c| c.load(Ordering::Relaxed) == 0)
            .unwrap_or(true);
        let idle_empty = self.idle.get(origin).map(|b| b.is_empty()).unwrap_or(true);
        if using_empty {
            self.using_counts.remove(origin);
        }
        if idle_empty {
            self.idle.remove(origin);
        }
    }

    fn is_tracking_any_origin(&self) -> bool {
        !self.idle.is_empty() || !self.using_counts.is_empty()
    }

    /// Starts the 1s keepalive sweep iff at least one origin key exists
    /// and it isn't already running.
    ///
    /// Only idle connections are swept; connect/read timeouts are applied
    /// inline around the dial and around the request drive respectively —
    /// see DESIGN.md for why a background sweep can't safely reach
    /// connections currently checked out by a request.
    fn ensure_sweep_running(self: &Arc<Self>) {
        if !self.is_tracking_any_origin() {
            return;
        }
        if self
            .sweep_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                pool.sweep_idle();
                if !pool.is_tracking_any_origin() {
                    pool.sweep_running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });
    }

    fn sweep_idle(&self) {
        let idle_timeout = Duration::from_secs(self.config.keepalive_timeout);
        let mut removed_total = 0usize;
        self.idle.retain(|origin, bucket| {
            let before = bucket.len();
            bucket.retain(|conn| !conn.is_idle_expired(idle_timeout));
            let removed = before - bucket.len();
            if removed > 0 {
                trace!(%origin, removed, "swept expired idle connections");
                removed_total += removed;
            }
            !bucket.is_empty()
        });
        if removed_total > 0 {
            debug!(removed_total, "keepalive sweep removed idle connections");
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_count(&self, origin: &Origin) -> usize {
        self.idle.get(origin).map(|b| b.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn using_count(&self, origin: &Origin) -> usize {
        self.using_counts
            .get(origin)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Scheme;

    fn test_origin(port: u16) -> Origin {
        Origin {
            scheme: Scheme::Http,
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn fetch_creates_new_connection_when_idle_empty() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let origin = test_origin(addr.port());

        let pool = ConnectionPool::new(PoolConfig::default());
        let pool2 = Arc::clone(&pool);
        let fetch_task = tokio::spawn(async move { pool2.fetch(&origin, None).await });
        let _ = listener.accept().await.unwrap();

        let conn = fetch_task.await.unwrap().unwrap();
        assert!(conn.is_some());
    }

    #[tokio::test]
    async fn recycle_then_fetch_reuses_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let origin = test_origin(addr.port());

        let pool = ConnectionPool::new(PoolConfig::default());
        let pool2 = Arc::clone(&pool);
        let origin2 = origin.clone();
        let fetch_task = tokio::spawn(async move { pool2.fetch(&origin2, None).await });
        let _ = listener.accept().await.unwrap();
        let conn = fetch_task.await.unwrap().unwrap().unwrap();

        pool.recycle(conn, true);
        assert_eq!(pool.idle_count(&origin), 1);
        assert_eq!(pool.using_count(&origin), 0);

        let conn2 = pool.fetch(&origin, None).await.unwrap();
        assert!(conn2.is_some());
        assert_eq!(pool.idle_count(&origin), 0);
    }

    #[tokio::test]
    async fn admission_blocks_beyond_max_conn_per_addr() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let origin = test_origin(addr.port());

        let pool = ConnectionPool::new(PoolConfig {
            max_conn_per_addr: 1,
            ..Default::default()
        });

        let pool2 = Arc::clone(&pool);
        let origin2 = origin.clone();
        let fetch_task = tokio::spawn(async move { pool2.fetch(&origin2, None).await });
        let _ = listener.accept().await.unwrap();
        let conn = fetch_task.await.unwrap().unwrap().unwrap();

        // Second fetch should be denied: in-use count already at the cap.
        let denied = pool.fetch(&origin, None).await.unwrap();
        assert!(denied.is_none());

        pool.recycle(conn, false);
        assert_eq!(pool.using_count(&origin), 0);
    }

    #[tokio::test]
    async fn connect_timeout_surfaces_code_one() {
        let pool = ConnectionPool::new(PoolConfig {
            connect_timeout: 1,
            ..Default::default()
        });
        let origin = Origin {
            scheme: Scheme::Http,
            host: "192.0.2.1".to_string(), // TEST-NET-1, non-routable
            port: 9,
        };

        let result = pool.fetch(&origin, None).await;
        match result {
            Err(ClientError::ConnectTimeout { .. }) => {}
            other => panic!("expected connect timeout, got {other:?}"),
        }
    }
}
