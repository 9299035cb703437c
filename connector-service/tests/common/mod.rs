//! Shared harness: a throwaway CA, a token signer and an echoing upstream.

#![allow(dead_code)]

use axum::{
    http::{header, HeaderMap},
    response::IntoResponse,
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use connector_service::{
    build_router,
    certs::CertCache,
    config::{ConnectorConfig, Environment},
    jwks::JwksCache,
    AppState,
};
use ed25519_dalek::{pkcs8::EncodePrivateKey, SigningKey};
use jsonwebtoken::{encode, jwk::JwkSet, EncodingKey, Header};
use rand::rngs::OsRng;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use serde_json::json;
use std::path::PathBuf;

pub const TEST_CA_NAME: &str = "Test Connector CA";

/// Headers the echo upstream sets on every response.
pub const UPSTREAM_FRAME_OPTIONS: &str = "SAMEORIGIN";
pub const UPSTREAM_CSP: &str = "default-src 'self'";

/// A fresh self-signed CA as (certificate PEM, key PEM).
pub fn test_ca() -> (String, String) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, TEST_CA_NAME);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

pub struct TestSigner {
    key: SigningKey,
    kid: String,
}

impl TestSigner {
    pub fn new(kid: &str) -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
            kid: kid.to_string(),
        }
    }

    pub fn jwks(&self) -> JwkSet {
        serde_json::from_value(json!({
            "keys": [{
                "kty": "OKP",
                "crv": "Ed25519",
                "x": URL_SAFE_NO_PAD.encode(self.key.verifying_key().as_bytes()),
                "kid": self.kid,
                "alg": "EdDSA",
                "use": "sig"
            }]
        }))
        .unwrap()
    }

    pub fn token(&self, name: &str, groups: &[&str], exp: i64) -> String {
        let der = self.key.to_pkcs8_der().unwrap();
        let mut header = Header::new(jsonwebtoken::Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        let claims = json!({
            "iss": "registry-service",
            "iat": exp - 300,
            "exp": exp,
            "name": name,
            "groups": groups,
        });
        encode(&header, &claims, &EncodingKey::from_ed_der(der.as_bytes())).unwrap()
    }
}

pub fn test_config(upstream_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "connector-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        registry_url: "http://127.0.0.1:1".to_string(),
        ca_cert_path: PathBuf::from("unused"),
        ca_key_path: PathBuf::from("unused"),
        hostnames: vec![],
        upstream_url: upstream_url.to_string(),
        jwks_cache_seconds: 300,
    }
}

/// Upstream that answers every request with the method, path and headers it saw.
pub async fn spawn_echo_upstream() -> String {
    async fn echo(
        method: axum::http::Method,
        uri: axum::http::Uri,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        let mut seen = serde_json::Map::new();
        for name in headers.keys() {
            let values: Vec<String> = headers
                .get_all(name)
                .iter()
                .map(|v| v.to_str().unwrap_or_default().to_string())
                .collect();
            seen.insert(name.as_str().to_string(), json!(values));
        }
        (
            [
                (header::X_FRAME_OPTIONS, UPSTREAM_FRAME_OPTIONS),
                (header::CONTENT_SECURITY_POLICY, UPSTREAM_CSP),
            ],
            Json(json!({
                "method": method.as_str(),
                "path": uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/"),
                "headers": seen,
            })),
        )
    }

    let app = Router::new().fallback(echo);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub struct TestConnector {
    pub router: Router,
    pub state: AppState,
    pub signer: TestSigner,
    pub ca_cert_pem: String,
}

impl TestConnector {
    pub async fn spawn() -> Self {
        let upstream = spawn_echo_upstream().await;
        let (ca_cert_pem, ca_key_pem) = test_ca();
        let certs = CertCache::new(&ca_cert_pem, &ca_key_pem).unwrap();
        let signer = TestSigner::new("registry-key");

        let state = AppState::with_jwks(
            test_config(&upstream),
            certs,
            JwksCache::fixed(signer.jwks()),
        )
        .unwrap();

        Self {
            router: build_router(state.clone()),
            state,
            signer,
            ca_cert_pem,
        }
    }
}
