//! Agent configuration record and validation.
//!
//! Options are collected once at startup, validated exactly once before any
//! network activity, and treated as read-only afterwards. Validation only
//! stats the referenced files; parsing their contents is the secured-channel
//! builder's job.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

/// Default admin surface bind address.
pub const DEFAULT_ADMIN_BIND: &str = "127.0.0.1:8093";

/// Configuration validation failures. All are fatal to startup.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{role} file {path} does not exist")]
    MissingFile { role: &'static str, path: PathBuf },

    #[error("agent {present} is set but agent {missing} is empty; mutual-auth identity requires both")]
    IncompleteIdentity {
        present: &'static str,
        missing: &'static str,
    },

    #[error("proxy server port {0} must be greater than 0")]
    InvalidPort(u16),
}

/// Operator-supplied agent configuration.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Agent identity certificate (PEM) for mutual auth.
    pub agent_cert: Option<PathBuf>,

    /// Agent identity private key (PEM) for mutual auth.
    pub agent_key: Option<PathBuf>,

    /// Trust-root override used to verify the proxy server.
    pub ca_cert: Option<PathBuf>,

    /// Hostname or IP of the proxy server.
    pub proxy_server_host: String,

    /// Port the proxy server is listening on.
    pub proxy_server_port: u16,

    /// Bind address for the admin HTTP surface.
    pub admin_bind_addr: SocketAddr,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            agent_cert: None,
            agent_key: None,
            ca_cert: None,
            proxy_server_host: "127.0.0.1".to_string(),
            proxy_server_port: 8091,
            admin_bind_addr: DEFAULT_ADMIN_BIND.parse().unwrap(),
        }
    }
}

/// Treat an empty path the same as an unset one.
fn set_path(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|p| !p.as_os_str().is_empty())
}

impl AgentOptions {
    pub fn agent_cert(&self) -> Option<&Path> {
        set_path(&self.agent_cert)
    }

    pub fn agent_key(&self) -> Option<&Path> {
        set_path(&self.agent_key)
    }

    pub fn ca_cert(&self) -> Option<&Path> {
        set_path(&self.ca_cert)
    }

    /// The `host:port` dial target for the tunnel connection.
    pub fn proxy_server_addr(&self) -> String {
        format!("{}:{}", self.proxy_server_host, self.proxy_server_port)
    }

    /// Check the configuration invariants.
    ///
    /// Order is fixed for deterministic error messages: key, cert, CA, port.
    /// Existence checks are the only filesystem side effect.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(key) = self.agent_key() {
            if !key.exists() {
                return Err(ValidationError::MissingFile {
                    role: "agent key",
                    path: key.to_path_buf(),
                });
            }
            if self.agent_cert().is_none() {
                return Err(ValidationError::IncompleteIdentity {
                    present: "key",
                    missing: "cert",
                });
            }
        }

        if let Some(cert) = self.agent_cert() {
            if !cert.exists() {
                return Err(ValidationError::MissingFile {
                    role: "agent cert",
                    path: cert.to_path_buf(),
                });
            }
            if self.agent_key().is_none() {
                return Err(ValidationError::IncompleteIdentity {
                    present: "cert",
                    missing: "key",
                });
            }
        }

        if let Some(ca) = self.ca_cert() {
            if !ca.exists() {
                return Err(ValidationError::MissingFile {
                    role: "CA cert",
                    path: ca.to_path_buf(),
                });
            }
        }

        if self.proxy_server_port == 0 {
            return Err(ValidationError::InvalidPort(self.proxy_server_port));
        }

        Ok(())
    }

    /// Log the effective configuration at startup (diagnostic only).
    pub fn log_effective(&self) {
        let show = |p: Option<&Path>| {
            p.map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string())
        };

        info!("agent cert: {}", show(self.agent_cert()));
        info!("agent key: {}", show(self.agent_key()));
        info!("CA cert: {}", show(self.ca_cert()));
        info!("proxy server host: {}", self.proxy_server_host);
        info!("proxy server port: {}", self.proxy_server_port);
        info!("admin bind address: {}", self.admin_bind_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn existing_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap();
        path
    }

    #[test]
    fn defaults_validate() {
        // No identity, no CA, default port: valid.
        assert!(AgentOptions::default().validate().is_ok());
    }

    #[test]
    fn empty_path_strings_are_treated_as_unset() {
        let options = AgentOptions {
            agent_cert: Some(PathBuf::new()),
            agent_key: Some(PathBuf::new()),
            ca_cert: Some(PathBuf::new()),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn key_without_cert_is_incomplete() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = AgentOptions {
            agent_key: Some(existing_file(&dir, "agent.key")),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::IncompleteIdentity {
                present: "key",
                missing: "cert"
            }
        ));
    }

    #[test]
    fn cert_without_key_is_incomplete() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = AgentOptions {
            agent_cert: Some(existing_file(&dir, "agent.pem")),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(matches!(
            err,
            ValidationError::IncompleteIdentity {
                present: "cert",
                missing: "key"
            }
        ));
    }

    #[test]
    fn missing_key_file_reported_before_pairing() {
        let options = AgentOptions {
            agent_key: Some(PathBuf::from("/tmp/definitely-missing.key")),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        match err {
            ValidationError::MissingFile { role, path } => {
                assert_eq!(role, "agent key");
                assert_eq!(path, PathBuf::from("/tmp/definitely-missing.key"));
            }
            other => panic!("expected MissingFile, got {other:?}"),
        }
    }

    #[test]
    fn missing_cert_with_existing_key_names_the_cert() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing_cert = dir.path().join("missing.pem");
        let options = AgentOptions {
            agent_cert: Some(missing_cert.clone()),
            agent_key: Some(existing_file(&dir, "real.key")),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        match err {
            ValidationError::MissingFile { role, path } => {
                assert_eq!(role, "agent cert");
                assert_eq!(path, missing_cert);
            }
            other => panic!("expected MissingFile, got {other:?}"),
        }
    }

    #[test]
    fn missing_ca_file_fails() {
        let options = AgentOptions {
            ca_cert: Some(PathBuf::from("/tmp/definitely-missing-ca.pem")),
            ..Default::default()
        };
        assert!(matches!(
            options.validate().unwrap_err(),
            ValidationError::MissingFile { role: "CA cert", .. }
        ));
    }

    #[test]
    fn port_zero_is_invalid_regardless_of_other_fields() {
        let options = AgentOptions {
            proxy_server_port: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate().unwrap_err(),
            ValidationError::InvalidPort(0)
        ));
    }

    #[test]
    fn complete_identity_with_real_files_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = AgentOptions {
            agent_cert: Some(existing_file(&dir, "agent.pem")),
            agent_key: Some(existing_file(&dir, "agent.key")),
            ca_cert: Some(existing_file(&dir, "ca.pem")),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn dial_target_formats_host_and_port() {
        let options = AgentOptions::default();
        assert_eq!(options.proxy_server_addr(), "127.0.0.1:8091");
    }
}
