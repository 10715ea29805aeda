// encrypted_file.rs — AES-256-GCM encrypted file provider.
//
// Credentials live in a single file under a directory with 0700/0600
// permissions. The encryption key is derived from machine-id + username +
// a fixed salt; that is deliberately not a strong secret — it ties the file
// to the device and account so casual copying is useless, nothing more.
//
// File layout: 12-byte random GCM nonce, then the ciphertext of a JSON map
// keyed by credential type. A fresh nonce is drawn on every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::credential::{Credential, CredentialType};
use crate::error::CredentialError;
use crate::provider::CredentialProvider;

const STORE_FILE: &str = "credentials.enc";
const NONCE_LEN: usize = 12;
const KEY_SALT: &[u8] = b"aibox-credential-store-v1";

/// Provider backed by an encrypted file under a per-machine, per-user key.
pub struct EncryptedFileProvider {
    dir: PathBuf,
    key: [u8; 32],
}

impl EncryptedFileProvider {
    /// Open (or create) the store directory and derive the device key.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| CredentialError::Io {
            path: dir.clone(),
            source,
        })?;
        restrict_permissions(&dir, 0o700)?;

        Ok(Self {
            dir,
            key: derive_key(&machine_id(), &username()),
        })
    }

    fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn load(&self) -> Result<BTreeMap<CredentialType, Credential>, CredentialError> {
        let path = self.store_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = std::fs::read(&path).map_err(|source| CredentialError::Io {
            path: path.clone(),
            source,
        })?;
        if bytes.len() < NONCE_LEN {
            return Err(CredentialError::CiphertextTooShort { path });
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::DecryptionFailed { path })?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn save(&self, store: &BTreeMap<CredentialType, Credential>) -> Result<(), CredentialError> {
        let path = self.store_path();
        let plaintext = serde_json::to_vec(store)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| CredentialError::Provider {
                provider: "encrypted-file".to_string(),
                op: "encrypt".to_string(),
                message: "AEAD encryption failed".to_string(),
            })?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        bytes.extend_from_slice(&nonce);
        bytes.extend_from_slice(&ciphertext);
        std::fs::write(&path, &bytes).map_err(|source| CredentialError::Io {
            path: path.clone(),
            source,
        })?;
        restrict_permissions(&path, 0o600)
    }
}

impl CredentialProvider for EncryptedFileProvider {
    fn name(&self) -> &str {
        "encrypted-file"
    }

    fn get(&self, credential_type: CredentialType) -> Result<Option<Credential>, CredentialError> {
        Ok(self.load()?.get(&credential_type).cloned())
    }

    fn store(&self, credential: &Credential) -> Result<(), CredentialError> {
        let mut store = self.load()?;
        store.insert(credential.credential_type, credential.clone());
        self.save(&store)
    }

    fn delete(&self, credential_type: CredentialType) -> Result<(), CredentialError> {
        let mut store = self.load()?;
        if store.remove(&credential_type).is_some() {
            self.save(&store)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<CredentialType>, CredentialError> {
        Ok(self.load()?.keys().copied().collect())
    }
}

/// Key material = SHA-256(machine_id || username || salt).
fn derive_key(machine_id: &str, username: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(machine_id.as_bytes());
    hasher.update(username.as_bytes());
    hasher.update(KEY_SALT);
    hasher.finalize().into()
}

/// Best-effort machine identity: systemd machine-id, dbus fallback, then
/// hostname. Ties the store to the device, nothing stronger.
fn machine_id() -> String {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(id) = std::fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                return id.to_string();
            }
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-machine".to_string())
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<(), CredentialError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        CredentialError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<(), CredentialError> {
    Ok(())
}
