use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::{info, warn};
use wtransport::Identity;

use crate::config::ServerConfig;

// Dev certificate paths (generated via scripts/gen-dev-cert)
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// TLS configuration for the WebTransport server
pub struct TlsConfig {
    /// The wtransport Identity containing certificate and key
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate (for browser
    /// serverCertificateHashes)
    cert_hash: String,
}

impl TlsConfig {
    /// Load the TLS identity.
    ///
    /// Priority: configured PEM paths, then the dev pair under certs/, then
    /// an in-memory self-signed localhost identity so a bare checkout still
    /// runs.
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) {
            info!("Loading TLS certificate from configured paths");
            return Self::load_from_paths(cert_path, key_path).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            return Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await;
        }

        warn!("No TLS certificate configured, generating a self-signed identity");
        let identity = Identity::self_signed(["localhost", "127.0.0.1", "::1"])
            .context("Failed to generate self-signed identity")?;
        Self::from_identity(identity)
    }

    /// Load certificate from PEM file paths
    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;
        Self::from_identity(identity)
    }

    fn from_identity(identity: Identity) -> Result<Self> {
        let cert_hash = compute_cert_hash(&identity);
        info!(
            "Chrome flag: --ignore-certificate-errors-spki-list={}",
            cert_hash
        );
        Ok(Self {
            identity,
            cert_hash,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

fn compute_cert_hash(identity: &Identity) -> String {
    identity
        .certificate_chain()
        .as_slice()
        .first()
        .map(|cert| {
            let der_bytes = cert.der();
            let hash = digest(&SHA256, der_bytes);
            STANDARD.encode(hash.as_ref())
        })
        .unwrap_or_default()
}
