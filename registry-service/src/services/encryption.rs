//! Envelope encryption: a data key wrapped by a root key provider.
//!
//! The data key is loaded once at startup and passed explicitly to whatever
//! seals fields at rest.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use service_core::error::AppError;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::db::{self, Database};

pub const ALGORITHM_AESGCM: &str = "aesgcm";
pub const DB_KEY_NAME: &str = "dbkey";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// A data key in both forms. `unencrypted` never leaves process memory.
#[derive(Clone)]
pub struct SymmetricKey {
    pub unencrypted: Vec<u8>,
    pub encrypted: Vec<u8>,
    pub algorithm: String,
    pub root_key_id: String,
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .field("root_key_id", &self.root_key_id)
            .finish_non_exhaustive()
    }
}

/// Source of root keys that wrap and unwrap data keys.
#[async_trait]
pub trait RootKeyProvider: Send + Sync {
    async fn generate_data_key(&self, root_key_id: &str) -> Result<SymmetricKey, anyhow::Error>;

    async fn decrypt_data_key(
        &self,
        root_key_id: &str,
        encrypted: &[u8],
    ) -> Result<SymmetricKey, anyhow::Error>;
}

/// Keeps root keys as files named by id under a directory.
#[derive(Debug, Clone)]
pub struct NativeKeyProvider {
    key_directory: PathBuf,
}

impl NativeKeyProvider {
    pub fn new(key_directory: impl Into<PathBuf>) -> Self {
        Self {
            key_directory: key_directory.into(),
        }
    }

    fn root_key_path(&self, root_key_id: &str) -> Result<PathBuf, anyhow::Error> {
        let valid = !root_key_id.is_empty()
            && root_key_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            && !root_key_id.starts_with('.');
        if !valid {
            anyhow::bail!("invalid root key id: {:?}", root_key_id);
        }
        Ok(self.key_directory.join(root_key_id))
    }

    async fn read_root_key(path: &Path) -> Result<Vec<u8>, anyhow::Error> {
        let key = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read root key {}: {}", path.display(), e))?;
        if key.len() != KEY_LEN {
            anyhow::bail!("root key {} has invalid length", path.display());
        }
        Ok(key)
    }

    async fn load_or_create_root_key(&self, root_key_id: &str) -> Result<Vec<u8>, anyhow::Error> {
        let path = self.root_key_path(root_key_id)?;
        if tokio::fs::try_exists(&path).await? {
            return Self::read_root_key(&path).await;
        }

        tokio::fs::create_dir_all(&self.key_directory).await?;
        let mut key = vec![0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        write_private_file(&path, &key).await?;
        tracing::info!(root_key_id, "created root key");
        Ok(key)
    }
}

#[cfg(unix)]
async fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), anyhow::Error> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), anyhow::Error> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

#[async_trait]
impl RootKeyProvider for NativeKeyProvider {
    async fn generate_data_key(&self, root_key_id: &str) -> Result<SymmetricKey, anyhow::Error> {
        let root = self.load_or_create_root_key(root_key_id).await?;

        let mut data_key = vec![0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut data_key);
        let encrypted = seal_bytes(&root, &data_key)?;

        Ok(SymmetricKey {
            unencrypted: data_key,
            encrypted,
            algorithm: ALGORITHM_AESGCM.to_string(),
            root_key_id: root_key_id.to_string(),
        })
    }

    async fn decrypt_data_key(
        &self,
        root_key_id: &str,
        encrypted: &[u8],
    ) -> Result<SymmetricKey, anyhow::Error> {
        let root = Self::read_root_key(&self.root_key_path(root_key_id)?).await?;
        let data_key = open_bytes(&root, encrypted)?;

        Ok(SymmetricKey {
            unencrypted: data_key,
            encrypted: encrypted.to_vec(),
            algorithm: ALGORITHM_AESGCM.to_string(),
            root_key_id: root_key_id.to_string(),
        })
    }
}

/// AES-256-GCM with a random nonce; output is `nonce || ciphertext`.
fn seal_bytes(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow::anyhow!("invalid key length"))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| anyhow::anyhow!("encryption failed"))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_bytes(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    if sealed.len() < NONCE_LEN {
        anyhow::bail!("ciphertext too short");
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow::anyhow!("invalid key length"))?;
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| anyhow::anyhow!("decryption failed"))
}

/// The unwrapped database data key.
#[derive(Clone)]
pub struct DataKey {
    key: Vec<u8>,
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(***)")
    }
}

impl DataKey {
    pub fn from_bytes(key: &[u8]) -> Result<Self, anyhow::Error> {
        if key.len() != KEY_LEN {
            anyhow::bail!("data key must be {} bytes", KEY_LEN);
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Random key, for tests and tooling.
    pub fn generate() -> Self {
        let mut key = vec![0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Encrypt and base64 encode.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, anyhow::Error> {
        Ok(STANDARD.encode(seal_bytes(&self.key, plaintext)?))
    }

    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, anyhow::Error> {
        let raw = STANDARD
            .decode(sealed)
            .map_err(|e| anyhow::anyhow!("sealed value is not base64: {}", e))?;
        open_bytes(&self.key, &raw)
    }

    pub fn seal_str(&self, plaintext: &str) -> Result<String, anyhow::Error> {
        self.seal(plaintext.as_bytes())
    }

    pub fn open_str(&self, sealed: &str) -> Result<String, anyhow::Error> {
        String::from_utf8(self.open(sealed)?)
            .map_err(|_| anyhow::anyhow!("sealed value is not utf-8"))
    }
}

/// Load the deployment's data key, creating and persisting it on first boot.
///
/// Any failure here must stop the process.
pub async fn load_data_key(
    db: &Database,
    provider: &dyn RootKeyProvider,
    root_key_id: &str,
) -> Result<DataKey, AppError> {
    let mut tx = db.begin().await?;

    let key = match db::encryption_keys::find_by_name(&mut tx, DB_KEY_NAME).await? {
        Some(record) => {
            if record.algorithm != ALGORITHM_AESGCM {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "unsupported data key algorithm: {}",
                    record.algorithm
                )));
            }
            let key = provider
                .decrypt_data_key(&record.root_key_id, &record.encrypted)
                .await
                .map_err(|e| AppError::ConfigError(e.context("failed to unwrap data key")))?;
            tracing::info!(root_key_id = %record.root_key_id, "loaded data key");
            key
        }
        None => {
            let key = provider
                .generate_data_key(root_key_id)
                .await
                .map_err(|e| AppError::ConfigError(e.context("failed to generate data key")))?;
            db::encryption_keys::insert(
                &mut tx,
                DB_KEY_NAME,
                &key.encrypted,
                &key.algorithm,
                &key.root_key_id,
            )
            .await?;
            tracing::info!(root_key_id, "created data key");
            key
        }
    };

    tx.commit().await?;
    Ok(DataKey::from_bytes(&key.unencrypted)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_db;

    #[test]
    fn seal_and_open() {
        let key = DataKey::generate();
        let sealed = key.seal_str("client-secret").unwrap();
        assert!(!sealed.contains("client-secret"));
        assert_eq!(key.open_str(&sealed).unwrap(), "client-secret");
    }

    #[test]
    fn sealing_is_randomised() {
        let key = DataKey::generate();
        assert_ne!(key.seal_str("x").unwrap(), key.seal_str("x").unwrap());
    }

    #[test]
    fn wrong_key_cannot_open() {
        let sealed = DataKey::generate().seal_str("secret").unwrap();
        assert!(DataKey::generate().open_str(&sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = DataKey::generate();
        let mut raw = STANDARD.decode(key.seal_str("secret").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(key.open_str(&STANDARD.encode(raw)).is_err());
    }

    #[test]
    fn debug_hides_key_material() {
        let key = DataKey::from_bytes(&[7u8; 32]).unwrap();
        assert_eq!(format!("{:?}", key), "DataKey(***)");
        assert!(DataKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[tokio::test]
    async fn native_provider_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let provider = NativeKeyProvider::new(dir.path().join("keys"));

        let generated = provider.generate_data_key("dbkey.root").await.unwrap();
        assert_eq!(generated.algorithm, ALGORITHM_AESGCM);
        assert!(dir.path().join("keys").join("dbkey.root").exists());

        let decrypted = provider
            .decrypt_data_key("dbkey.root", &generated.encrypted)
            .await
            .unwrap();
        assert_eq!(decrypted.unencrypted, generated.unencrypted);
    }

    #[tokio::test]
    async fn native_provider_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let provider = NativeKeyProvider::new(dir.path());
        assert!(provider.generate_data_key("../escape").await.is_err());
        assert!(provider.generate_data_key("").await.is_err());
    }

    #[tokio::test]
    async fn load_data_key_is_stable_across_boots() {
        let db = memory_db().await;
        let dir = tempfile::tempdir().unwrap();
        let provider = NativeKeyProvider::new(dir.path());

        let first = load_data_key(&db, &provider, "dbkey.root").await.unwrap();
        let sealed = first.seal_str("token").unwrap();

        let second = load_data_key(&db, &provider, "dbkey.root").await.unwrap();
        assert_eq!(second.open_str(&sealed).unwrap(), "token");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM encryption_keys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn load_data_key_fails_without_root_key() {
        let db = memory_db().await;
        let dir = tempfile::tempdir().unwrap();
        load_data_key(&db, &NativeKeyProvider::new(dir.path()), "dbkey.root")
            .await
            .unwrap();

        let other = tempfile::tempdir().unwrap();
        let err = load_data_key(&db, &NativeKeyProvider::new(other.path()), "dbkey.root")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
