//! Request serialisation.

use super::types::{Headers, Method};
use crate::config::HttpVersion;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

/// One part of a `multipart/form-data` body. Construction of the parts
/// themselves is the caller's job; this crate only frames already-built
/// parts onto the wire.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub headers: Headers,
    pub contents: Vec<u8>,
}

/// The request body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Raw(Vec<u8>),
    Form(Vec<(String, String)>),
    Multipart(Vec<MultipartPart>),
}

impl Body {
    fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
            || matches!(self, Body::Form(f) if f.is_empty())
            || matches!(self, Body::Raw(b) if b.is_empty())
    }
}

/// Fully resolved parameters for a single outgoing request, after folding
/// the option bag's overrides onto the base URL.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub version: HttpVersion,
    pub url: Url,
    pub headers: Headers,
    pub body: Body,
}

impl RequestSpec {
    /// Apply the option bag's `query` (URL-encoded per RFC 3986) by
    /// replacing the URI's query string.
    pub fn with_query(mut self, query: &[(String, String)]) -> Self {
        if !query.is_empty() {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in query {
                serializer.append_pair(k, v);
            }
            self.url.set_query(Some(&serializer.finish()));
        }
        self
    }

    fn request_target(&self) -> String {
        let mut target = self.url.path().to_string();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(q) = self.url.query() {
            target.push('?');
            target.push_str(q);
        }
        target
    }

    fn boundary(&self) -> String {
        format!("----pooled-http-client-{}", uuid::Uuid::new_v4().simple())
    }

    fn encode_body(&self, content_type_override: Option<&str>) -> (Vec<u8>, Option<String>) {
        match &self.body {
            Body::Empty => (Vec::new(), None),
            Body::Raw(bytes) => (bytes.clone(), content_type_override.map(str::to_string)),
            Body::Form(pairs) => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (k, v) in pairs {
                    serializer.append_pair(k, v);
                }
                (
                    serializer.finish().into_bytes(),
                    Some("application/x-www-form-urlencoded".to_string()),
                )
            }
            Body::Multipart(parts) => {
                let boundary = self.boundary();
                let mut buf = BytesMut::new();
                for part in parts {
                    buf.put_slice(format!("--{boundary}\r\n").as_bytes());
                    let mut disposition =
                        format!("Content-Disposition: form-data; name=\"{}\"", part.name);
                    if let Some(filename) = &part.filename {
                        disposition.push_str(&format!("; filename=\"{filename}\""));
                    }
                    buf.put_slice(disposition.as_bytes());
                    buf.put_slice(b"\r\n");
                    for (name, value) in part.headers.iter() {
                        buf.put_slice(format!("{name}: {value}\r\n").as_bytes());
                    }
                    buf.put_slice(b"\r\n");
                    buf.put_slice(&part.contents);
                    buf.put_slice(b"\r\n");
                }
                buf.put_slice(format!("--{boundary}--\r\n").as_bytes());
                (
                    buf.to_vec(),
                    Some(format!("multipart/form-data; boundary={boundary}")),
                )
            }
        }
    }

    /// Serialise the canonical request line, headers, and body onto
    /// `writer`.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut headers = self.headers.clone();

        let (body_bytes, default_content_type) = self.encode_body(headers.get("Content-Type"));
        if !headers.contains("Content-Type") {
            if let Some(ct) = default_content_type {
                headers.set("Content-Type", ct);
            }
        }
        if !self.body.is_empty() {
            headers.set("Content-Length", body_bytes.len().to_string());
        }
        if !headers.contains("Host") {
            let host = self.url.host_str().unwrap_or_default();
            match self.url.port() {
                Some(p) => headers.set("Host", format!("{host}:{p}")),
                None => headers.set("Host", host.to_string()),
            }
        }
        if !headers.contains("Connection") && matches!(self.version, HttpVersion::Http11) {
            headers.set("Connection", "keep-alive");
        }

        let mut out = BytesMut::new();
        out.put_slice(
            format!(
                "{} {} HTTP/{}\r\n",
                self.method,
                self.request_target(),
                self.version
            )
            .as_bytes(),
        );
        for (name, value) in headers.iter() {
            out.put_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.put_slice(b"\r\n");
        out.put_slice(&body_bytes);

        writer.write_all(&out).await?;
        writer.flush().await
    }
}
