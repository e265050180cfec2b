//! Client-side TLS configuration for the secured channel.
//!
//! Turns operator-supplied PEM file paths into a ready-to-use rustls client
//! config: an optional custom trust root (falling back to the webpki roots),
//! and optional mutual authentication when an identity cert/key pair is
//! given. Content problems in any of the files surface here, not in
//! options validation, and are fatal to startup.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use thiserror::Error;
use tokio_rustls::TlsConnector;

/// Errors building the secured-channel configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse certificates in {path}: {source}")]
    ParseCerts {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("invalid CA certificate in {path}: {source}")]
    InvalidCa {
        path: PathBuf,
        source: rustls::Error,
    },

    #[error("invalid agent identity cert/key pair: {0}")]
    InvalidIdentity(rustls::Error),

    #[error("invalid server name for certificate verification: {0}")]
    InvalidServerName(String),
}

/// Immutable client TLS configuration for the tunnel connection.
///
/// Holds the rustls config and the server name the proxy server's
/// certificate is verified against.
#[derive(Clone)]
pub struct ClientTlsConfig {
    config: Arc<rustls::ClientConfig>,
    server_name: ServerName<'static>,
}

impl ClientTlsConfig {
    /// Build the secured-channel configuration.
    ///
    /// * `ca_cert` — trust-root override; when `None` the webpki root store
    ///   is used.
    /// * `agent_cert` / `agent_key` — identity pair enabling mutual auth;
    ///   callers are expected to pass both or neither (options validation
    ///   enforces the pairing).
    /// * `server_host` — the name the proxy server's certificate must match.
    pub fn build(
        ca_cert: Option<&Path>,
        agent_cert: Option<&Path>,
        agent_key: Option<&Path>,
        server_host: &str,
    ) -> Result<Self, TlsError> {
        ensure_crypto_provider();

        let mut roots = rustls::RootCertStore::empty();
        match ca_cert {
            Some(path) => {
                for cert in load_certs(path)? {
                    roots.add(cert).map_err(|e| TlsError::InvalidCa {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                }
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
        }

        let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

        let config = match (agent_cert, agent_key) {
            (Some(cert_path), Some(key_path)) => {
                let certs = load_certs(cert_path)?;
                let key = load_private_key(key_path)?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(TlsError::InvalidIdentity)?
            }
            _ => builder.with_no_client_auth(),
        };

        let server_name = ServerName::try_from(server_host.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_host.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            server_name,
        })
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.config.clone())
    }

    pub fn server_name(&self) -> ServerName<'static> {
        self.server_name.clone()
    }

    /// Whether the configuration presents a client identity (mutual auth).
    pub fn has_client_auth(&self) -> bool {
        self.config.client_auth_cert_resolver.has_certs()
    }
}

impl std::fmt::Debug for ClientTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTlsConfig")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

// Initialize rustls crypto provider once per process.
static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::ParseCerts {
            path: path.to_path_buf(),
            source: e,
        })?;

    if certs.is_empty() {
        return Err(TlsError::ParseCerts {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "no certificates found in PEM file",
            ),
        });
    }

    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::ParseCerts {
            path: path.to_path_buf(),
            source: e,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
