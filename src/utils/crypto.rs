//! Sealing of small secrets (the feedback API key) for storage in SQLite.
//!
//! Each value is encrypted with AES-256-GCM under a key derived by PBKDF2 from
//! a random master secret and a per-value salt. The master secret lives in a
//! [`SecretStore`], normally the OS keyring, never in the database.
//!
//! Sealed format: `v1:` + base64(salt ‖ nonce ‖ ciphertext).

use std::path::Path;
use std::sync::{Arc, Mutex};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{AppError, AppResult};

const KEYRING_SERVICE: &str = "rubric-assessor.vault";
const SEALED_PREFIX: &str = "v1:";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const MASTER_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 120_000;

/// Where the master secret is kept.
pub trait SecretStore: Send + Sync {
    fn load(&self) -> AppResult<Option<Vec<u8>>>;
    fn store(&self, secret: &[u8]) -> AppResult<()>;
    fn remove(&self) -> AppResult<()>;
}

/// Master secret in the platform credential store, one entry per database file.
pub struct KeyringStore {
    account: String,
}

impl KeyringStore {
    pub fn new(account: impl Into<String>) -> AppResult<Self> {
        let store = Self {
            account: account.into(),
        };
        store.entry()?;
        Ok(store)
    }

    fn entry(&self) -> AppResult<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &self.account)
            .map_err(|err| AppError::other(format!("cannot open system keyring: {err}")))
    }
}

impl SecretStore for KeyringStore {
    fn load(&self) -> AppResult<Option<Vec<u8>>> {
        match self.entry()?.get_password() {
            Ok(encoded) => Base64
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(|_| AppError::other("keyring credential is corrupted")),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(AppError::other(format!("cannot read system keyring: {err}"))),
        }
    }

    fn store(&self, secret: &[u8]) -> AppResult<()> {
        self.entry()?
            .set_password(&Base64.encode(secret))
            .map_err(|err| AppError::other(format!("cannot write system keyring: {err}")))
    }

    fn remove(&self) -> AppResult<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(AppError::other(format!(
                "cannot remove credential from system keyring: {err}"
            ))),
        }
    }
}

/// Process-local master secret, for tests and hosts without a credential store.
#[derive(Default)]
pub struct MemoryStore {
    secret: Mutex<Option<Vec<u8>>>,
}

impl SecretStore for MemoryStore {
    fn load(&self) -> AppResult<Option<Vec<u8>>> {
        let guard = self
            .secret
            .lock()
            .map_err(|_| AppError::other("secret store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn store(&self, secret: &[u8]) -> AppResult<()> {
        let mut guard = self
            .secret
            .lock()
            .map_err(|_| AppError::other("secret store lock poisoned"))?;
        *guard = Some(secret.to_vec());
        Ok(())
    }

    fn remove(&self) -> AppResult<()> {
        let mut guard = self
            .secret
            .lock()
            .map_err(|_| AppError::other("secret store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CryptoVault {
    store: Arc<dyn SecretStore>,
}

impl CryptoVault {
    /// Vault backed by the keyring entry belonging to the database at `path`.
    pub fn from_database_path(path: &Path) -> AppResult<Self> {
        let store = KeyringStore::new(keyring_account(path))?;
        Ok(Self::with_store(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::default()))
    }

    pub fn with_store(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> AppResult<String> {
        seal(&self.master_secret()?, plaintext)
    }

    pub fn decrypt(&self, sealed: &str) -> AppResult<Vec<u8>> {
        open(&self.master_secret()?, sealed)
    }

    /// Forgets the master secret. Values sealed under it become unreadable.
    pub fn clear_master_secret(&self) -> AppResult<()> {
        self.store.remove()
    }

    fn master_secret(&self) -> AppResult<Vec<u8>> {
        if let Some(secret) = self.store.load()? {
            if secret.len() != MASTER_LEN {
                return Err(AppError::other("master secret has the wrong length"));
            }
            return Ok(secret);
        }

        debug!(target: "app::settings", "generating new master secret");
        let mut secret = vec![0u8; MASTER_LEN];
        OsRng.fill_bytes(&mut secret);
        self.store.store(&secret)?;
        Ok(secret)
    }
}

fn seal(master: &[u8], plaintext: &[u8]) -> AppResult<String> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher_for(master, &salt)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| AppError::other("encryption failed"))?;

    let mut packed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    packed.extend_from_slice(&salt);
    packed.extend_from_slice(&nonce);
    packed.extend_from_slice(&ciphertext);
    Ok(format!("{SEALED_PREFIX}{}", Base64.encode(packed)))
}

fn open(master: &[u8], sealed: &str) -> AppResult<Vec<u8>> {
    let packed = sealed
        .strip_prefix(SEALED_PREFIX)
        .ok_or_else(|| AppError::other("unsupported sealed value format"))
        .and_then(|encoded| {
            Base64
                .decode(encoded.as_bytes())
                .map_err(|_| AppError::other("sealed value is not valid base64"))
        })?;

    if packed.len() <= SALT_LEN + NONCE_LEN {
        return Err(AppError::other("sealed value is truncated"));
    }
    let (salt, rest) = packed.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    cipher_for(master, salt)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AppError::other("decryption failed"))
}

fn cipher_for(master: &[u8], salt: &[u8]) -> AppResult<Aes256Gcm> {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(master, salt, PBKDF2_ROUNDS, &mut key);
    Aes256Gcm::new_from_slice(&key).map_err(|_| AppError::other("cannot initialize cipher"))
}

fn keyring_account(path: &Path) -> String {
    let digest = Sha256::new()
        .chain_update(b"rubric-assessor.settings.v1")
        .chain_update(path.to_string_lossy().as_bytes())
        .finalize();
    let hex: String = digest[..16].iter().map(|byte| format!("{byte:02x}")).collect();
    format!("feedback-{hex}")
}
