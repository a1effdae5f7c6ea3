//! TLS context for the connection pool's dial path.
//!
//! `{verify_peer=false, verify_peer_name=false, allow_self_signed=true}` is
//! the default when a request targets `https` and no user-supplied context
//! is given, so the pool can always dial. Overridable by supplying a
//! `TlsContext::custom`.

use crate::error::{ClientError, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};
use std::io::BufReader;
use std::sync::Arc;

/// Wraps a `rustls::ClientConfig` so pool callers can hand in their own TLS
/// context without the pool needing to know how it was built.
#[derive(Clone)]
pub struct TlsContext {
    pub(crate) config: Arc<ClientConfig>,
}

impl TlsContext {
    pub fn custom(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    /// `{verify_peer=false, verify_peer_name=false, allow_self_signed=true}`.
    pub fn insecure_default() -> Self {
        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
        }
    }

    /// Build a verifying context that trusts only the CA certificates in
    /// `pem`, for callers who want real verification instead of
    /// `insecure_default` (e.g. against a private CA).
    pub fn from_pem_root_ca(pem: &[u8]) -> Result<Self> {
        let mut reader = BufReader::new(pem);
        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| ClientError::Tls(e.to_string()))?;
            roots
                .add(cert)
                .map_err(|e| ClientError::Tls(e.to_string()))?;
        }
        if roots.is_empty() {
            return Err(ClientError::Tls("no certificates found in PEM".to_string()));
        }
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            config: Arc::new(config),
        })
    }
}

impl Default for TlsContext {
    fn default() -> Self {
        Self::insecure_default()
    }
}

#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
