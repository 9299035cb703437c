//! Per-host leaf certificates signed by a loaded CA, selected by SNI.
//!
//! The cache always holds a certificate for the empty hostname, issued when
//! the cache is built, so a handshake can complete before any host has been
//! provisioned. Unknown or missing server names get that fallback; hosts are
//! only ever added through [`CertCache::add_host`].

use dashmap::DashMap;
use rcgen::{
    CertificateParams, DnType, ExtendedKeyUsagePurpose, Issuer, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Cache key of the certificate served when SNI is absent or unknown.
pub const FALLBACK_HOST: &str = "";

const FALLBACK_COMMON_NAME: &str = "connector";
const LEAF_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("invalid CA certificate or key: {0}")]
    InvalidCa(String),

    #[error("failed to issue certificate for {host:?}: {source}")]
    Issue { host: String, source: rcgen::Error },

    #[error("unsupported private key: {0}")]
    Key(#[from] rustls::Error),
}

impl From<CertError> for AppError {
    fn from(err: CertError) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

pub struct CertCache {
    issuer: Issuer<'static, KeyPair>,
    ca_der: CertificateDer<'static>,
    fallback: Arc<CertifiedKey>,
    hosts: DashMap<String, Arc<CertifiedKey>>,
}

impl fmt::Debug for CertCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertCache")
            .field("hosts", &self.hosts())
            .finish_non_exhaustive()
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl CertCache {
    /// Parse the CA once and seed the fallback entry.
    pub fn new(ca_cert_pem: &str, ca_key_pem: &str) -> Result<Self, CertError> {
        let ca_key =
            KeyPair::from_pem(ca_key_pem).map_err(|e| CertError::InvalidCa(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, ca_key)
            .map_err(|e| CertError::InvalidCa(e.to_string()))?;
        let ca_der = CertificateDer::from_pem_slice(ca_cert_pem.as_bytes())
            .map_err(|e| CertError::InvalidCa(e.to_string()))?;

        let fallback = issue_leaf(&issuer, &ca_der, FALLBACK_HOST)?;
        let hosts = DashMap::new();
        hosts.insert(FALLBACK_HOST.to_string(), fallback.clone());

        Ok(Self {
            issuer,
            ca_der,
            fallback,
            hosts,
        })
    }

    /// Return the certificate for `hostname`, issuing one on first use.
    ///
    /// Concurrent callers for the same host observe a single issuance.
    pub fn add_host(&self, hostname: &str) -> Result<Arc<CertifiedKey>, CertError> {
        let host = normalize(hostname);
        if let Some(existing) = self.hosts.get(&host) {
            return Ok(existing.value().clone());
        }

        let entry = self.hosts.entry(host.clone()).or_try_insert_with(|| {
            tracing::info!(host = %host, "issuing host certificate");
            issue_leaf(&self.issuer, &self.ca_der, &host)
        })?;
        Ok(entry.value().clone())
    }

    /// Handshake lookup. Never issues; unknown names get the fallback.
    pub fn certificate(&self, server_name: Option<&str>) -> Arc<CertifiedKey> {
        server_name
            .map(normalize)
            .and_then(|host| self.hosts.get(&host).map(|e| e.value().clone()))
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Provisioned hostnames, sorted. Includes the fallback entry.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.hosts.iter().map(|e| e.key().clone()).collect();
        hosts.sort();
        hosts
    }
}

/// Sign a fresh leaf for `host`. The empty host gets a certificate without
/// DNS names.
fn issue_leaf(
    issuer: &Issuer<'static, KeyPair>,
    ca_der: &CertificateDer<'static>,
    host: &str,
) -> Result<Arc<CertifiedKey>, CertError> {
    let issue_err = |source| CertError::Issue {
        host: host.to_string(),
        source,
    };

    let key = KeyPair::generate().map_err(issue_err)?;
    let names = if host.is_empty() {
        Vec::new()
    } else {
        vec![host.to_string()]
    };

    let mut params = CertificateParams::new(names).map_err(issue_err)?;
    let common_name = if host.is_empty() {
        FALLBACK_COMMON_NAME
    } else {
        host
    };
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::hours(1);
    params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.use_authority_key_identifier_extension = true;

    let cert = params.signed_by(&key, issuer).map_err(issue_err)?;

    let private_key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&private_key)?;

    Ok(Arc::new(CertifiedKey::new(
        vec![cert.der().clone(), ca_der.clone()],
        signing_key,
    )))
}

impl ResolvesServerCert for CertCache {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.certificate(client_hello.server_name()))
    }
}
