//! Ed25519 signing keys, the published key set and short-lived user tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{pkcs8::EncodePrivateKey, SigningKey};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::db;
use crate::models::Settings;
use crate::services::authz::{self, Operation};
use crate::services::context::RequestContext;
use crate::services::encryption::DataKey;

/// Public half of the signing key as an OKP JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
}

impl PublicJwk {
    pub fn from_signing_key(key: &SigningKey) -> Self {
        let x = URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes());
        // RFC 7638 thumbprint over the required members in lexicographic order
        let canonical = format!(r#"{{"crv":"Ed25519","kty":"OKP","x":"{}"}}"#, x);
        let kid = URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()));

        Self {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x,
            kid,
            alg: "EdDSA".to_string(),
            use_: "sig".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<PublicJwk>,
}

/// A new signing key: sealed PKCS#8 for storage plus its public JWK.
pub struct GeneratedSigningKey {
    pub sealed_private_key: String,
    pub public_jwk: PublicJwk,
}

pub fn generate_signing_key(data_key: &DataKey) -> Result<GeneratedSigningKey, AppError> {
    let key = SigningKey::generate(&mut OsRng);
    let der = key
        .to_pkcs8_der()
        .map_err(|e| anyhow::anyhow!("failed to encode signing key: {}", e))?;

    Ok(GeneratedSigningKey {
        sealed_private_key: data_key.seal(der.as_bytes())?,
        public_jwk: PublicJwk::from_signing_key(&key),
    })
}

pub fn public_jwk(settings: &Settings) -> Result<PublicJwk, AppError> {
    serde_json::from_str(&settings.public_jwk)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("stored public key is invalid: {}", e)))
}

/// The key set published for relying parties.
pub fn jwks(settings: &Settings) -> Result<JwkSet, AppError> {
    Ok(JwkSet {
        keys: vec![public_jwk(settings)?],
    })
}

/// Claims carried by user tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub name: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenService {
    data_key: Arc<DataKey>,
    issuer: String,
    expiry: Duration,
}

impl TokenService {
    pub fn new(data_key: Arc<DataKey>, issuer: impl Into<String>, expiry: Duration) -> Self {
        Self {
            data_key,
            issuer: issuer.into(),
            expiry,
        }
    }

    /// Sign a token for the calling identity naming it and its groups.
    pub async fn create_token(&self, ctx: &RequestContext) -> Result<IssuedToken, AppError> {
        let identity_id = ctx
            .principal()
            .ok_or_else(|| AppError::unauthorized("authentication required"))?
            .identity_id();
        let (mut txn, _) = authz::authorize(ctx, Operation::CreateToken, identity_id).await?;

        let identity = db::identities::get(txn.conn(), identity_id).await?;
        let groups = db::identities::group_names(txn.conn(), identity_id).await?;
        let settings = db::settings::get(txn.conn()).await?;
        txn.commit().await?;

        let now = Utc::now();
        let expires = now + self.expiry;
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            name: identity.name,
            groups,
        };

        let token = self.sign(&settings, &claims)?;
        tracing::info!(identity_id, "token issued");
        Ok(IssuedToken { token, expires })
    }

    fn sign(&self, settings: &Settings, claims: &TokenClaims) -> Result<String, AppError> {
        let der = self.data_key.open(&settings.private_key)?;
        let encoding_key = EncodingKey::from_ed_der(&der);

        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(public_jwk(settings)?.kid);

        encode(&header, claims, &encoding_key)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("failed to sign token: {}", e)))
    }
}
