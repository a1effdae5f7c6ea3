//! An asynchronous HTTP/1.1 client with a per-origin connection pool: a
//! FIFO dispatcher hands queued requests a pooled connection, drives the
//! request/response exchange, and recycles or discards the connection
//! based on keep-alive negotiation.

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod origin;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod request_state;
pub mod tls;

pub use client::{Client, RequestOptions};
pub use config::{AllowRedirects, HttpVersion, PoolConfig};
pub use error::{ClientError, Result};
pub use origin::{Origin, Scheme};
pub use pool::connection::{ConnState, PooledConnection, Transport};
pub use pool::{ConnectionPool, PoolEvent};
pub use protocol::{Body, Headers, Method, MultipartPart, Response};
pub use tls::TlsContext;
