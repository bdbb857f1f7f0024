//! Storage for the catalog master key.
//!
//! Passwords in the catalog are encrypted with a single 256-bit key. The key
//! itself lives outside the catalog, in one of the pluggable providers:
//!
//! - **Debug builds**: `<data_dir>/credentials.json` (mode 0600), unless
//!   `PGPANEL_USE_KEYCHAIN=1` is set
//! - **Release builds**: OS keychain (macOS Keychain, Windows Credential
//!   Manager, Linux Secret Service)
//! - **Fallback**: in-memory session storage when the file cannot be used

use crate::error::PanelError;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keyring::Entry;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Service name used for keychain entries.
const KEYRING_SERVICE: &str = "pgpanel";

/// Environment variable forcing keychain usage in debug builds.
const FORCE_KEYCHAIN_ENV: &str = "PGPANEL_USE_KEYCHAIN";

/// Credentials file name inside the data directory.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Provider key of the catalog master key.
const MASTER_KEY: &str = "catalog:master-key";

/// Master key length in bytes (AES-256).
pub const MASTER_KEY_LEN: usize = 32;

/// Pluggable secret storage backend.
pub trait CredentialsProvider: Send + Sync {
    /// Store a credential.
    fn store(&self, key: &str, value: &str) -> Result<(), PanelError>;

    /// Get a credential.
    fn get(&self, key: &str) -> Result<Option<String>, PanelError>;

    /// Delete a credential.
    fn delete(&self, key: &str) -> Result<(), PanelError>;

    /// Check if a credential exists.
    fn exists(&self, key: &str) -> Result<bool, PanelError> {
        Ok(self.get(key)?.is_some())
    }

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// FileCredentialsProvider
// ============================================================================

/// JSON file storage with owner-only permissions.
#[derive(Debug)]
pub struct FileCredentialsProvider {
    file_path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialsFile {
    credentials: HashMap<String, String>,
}

impl FileCredentialsProvider {
    /// Use `<data_dir>/credentials.json`.
    pub fn new(data_dir: &Path) -> Result<Self, PanelError> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).map_err(|e| {
                PanelError::storage(
                    format!("Failed to create data directory: {e}"),
                    Some("Check permissions for the data directory"),
                )
            })?;
        }
        Self::with_path(data_dir.join(CREDENTIALS_FILE))
    }

    /// Use an explicit file path.
    pub fn with_path(file_path: PathBuf) -> Result<Self, PanelError> {
        let provider = Self { file_path, cache: RwLock::new(HashMap::new()) };
        provider.load_from_file()?;
        Ok(provider)
    }

    fn load_from_file(&self) -> Result<(), PanelError> {
        if !self.file_path.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(&self.file_path).map_err(|e| {
            PanelError::storage(format!("Failed to read credentials file: {e}"), None)
        })?;
        if contents.is_empty() {
            return Ok(());
        }

        let creds_file: CredentialsFile = serde_json::from_str(&contents).map_err(|e| {
            PanelError::storage(format!("Invalid credentials file format: {e}"), None)
        })?;

        *self.cache.write() = creds_file.credentials;
        Ok(())
    }

    fn save_to_file(&self) -> Result<(), PanelError> {
        let creds_file = CredentialsFile { credentials: self.cache.read().clone() };
        let json = serde_json::to_string_pretty(&creds_file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.file_path)
                .map_err(|e| {
                    PanelError::storage(format!("Failed to create credentials file: {e}"), None)
                })?;
            file.write_all(json.as_bytes()).map_err(|e| {
                PanelError::storage(format!("Failed to write credentials file: {e}"), None)
            })?;
        }

        #[cfg(not(unix))]
        {
            let mut file = fs::File::create(&self.file_path).map_err(|e| {
                PanelError::storage(format!("Failed to create credentials file: {e}"), None)
            })?;
            file.write_all(json.as_bytes()).map_err(|e| {
                PanelError::storage(format!("Failed to write credentials file: {e}"), None)
            })?;
        }

        Ok(())
    }
}

impl CredentialsProvider for FileCredentialsProvider {
    fn store(&self, key: &str, value: &str) -> Result<(), PanelError> {
        self.cache.write().insert(key.to_string(), value.to_string());
        self.save_to_file()?;
        tracing::debug!(key = key, "Credential stored in file");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, PanelError> {
        Ok(self.cache.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), PanelError> {
        self.cache.write().remove(key);
        self.save_to_file()?;
        tracing::debug!(key = key, "Credential deleted from file");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FileCredentialsProvider"
    }
}

// ============================================================================
// KeychainCredentialsProvider
// ============================================================================

/// OS keychain storage.
#[derive(Debug)]
pub struct KeychainCredentialsProvider {
    service: String,
}

impl Default for KeychainCredentialsProvider {
    fn default() -> Self {
        Self { service: KEYRING_SERVICE.to_string() }
    }
}

impl KeychainCredentialsProvider {
    /// Create a keychain provider for the `pgpanel` service.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialsProvider for KeychainCredentialsProvider {
    fn store(&self, key: &str, value: &str) -> Result<(), PanelError> {
        Entry::new(&self.service, key)?.set_password(value).map_err(|e| {
            PanelError::keyring(e.to_string(), Some("Allow pgpanel to access the system keychain"))
        })?;
        tracing::debug!(key = key, "Credential stored in keychain");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, PanelError> {
        match Entry::new(&self.service, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(PanelError::keyring(
                e.to_string(),
                Some("Allow pgpanel to access the system keychain"),
            )),
        }
    }

    fn delete(&self, key: &str) -> Result<(), PanelError> {
        match Entry::new(&self.service, key)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(key = key, "Credential deleted from keychain");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "KeychainCredentialsProvider"
    }
}

// ============================================================================
// SessionCredentialsProvider
// ============================================================================

/// In-memory storage. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct SessionCredentialsProvider {
    store: RwLock<HashMap<String, String>>,
}

impl SessionCredentialsProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialsProvider for SessionCredentialsProvider {
    fn store(&self, key: &str, value: &str) -> Result<(), PanelError> {
        self.store.write().insert(key.to_string(), value.to_string());
        tracing::debug!(key = key, "Credential stored in session");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, PanelError> {
        Ok(self.store.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), PanelError> {
        self.store.write().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SessionCredentialsProvider"
    }
}

// ============================================================================
// CredentialService
// ============================================================================

fn select_provider(data_dir: &Path) -> Box<dyn CredentialsProvider> {
    let force_keychain = std::env::var(FORCE_KEYCHAIN_ENV).map(|v| v == "1").unwrap_or(false);

    #[cfg(debug_assertions)]
    {
        if force_keychain {
            tracing::debug!(
                provider = "KeychainCredentialsProvider",
                reason = "PGPANEL_USE_KEYCHAIN=1",
                "Using keychain provider (override)"
            );
            return Box::new(KeychainCredentialsProvider::new());
        }

        match FileCredentialsProvider::new(data_dir) {
            Ok(provider) => Box::new(provider),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create file provider, falling back to session");
                Box::new(SessionCredentialsProvider::new())
            }
        }
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = (force_keychain, data_dir);
        Box::new(KeychainCredentialsProvider::new())
    }
}

/// Owner of the catalog master key.
pub struct CredentialService {
    provider: Box<dyn CredentialsProvider>,
}

impl CredentialService {
    /// Pick the provider for this build and data directory.
    pub fn new(data_dir: &Path) -> Self {
        let provider = select_provider(data_dir);
        tracing::info!(provider = provider.name(), "Credential service initialized");
        Self { provider }
    }

    /// Use a specific provider.
    pub fn with_provider(provider: Box<dyn CredentialsProvider>) -> Self {
        Self { provider }
    }

    /// Get the name of the active provider.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Load the master key, generating and storing one on first use.
    pub fn master_key(&self) -> Result<[u8; MASTER_KEY_LEN], PanelError> {
        if let Some(encoded) = self.provider.get(MASTER_KEY)? {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| PanelError::crypto(format!("Stored master key is not base64: {e}")))?;
            return bytes.try_into().map_err(|bytes: Vec<u8>| {
                PanelError::crypto(format!("Stored master key has {} bytes", bytes.len()))
            });
        }

        let mut key = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        self.provider.store(MASTER_KEY, &STANDARD.encode(key))?;
        tracing::info!(provider = self.provider.name(), "Generated catalog master key");
        Ok(key)
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService").field("provider", &self.provider.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_provider_store_and_get() {
        let dir = tempdir().unwrap();
        let provider = FileCredentialsProvider::new(dir.path()).unwrap();

        provider.store("test_key", "test_value").unwrap();
        assert_eq!(provider.get("test_key").unwrap(), Some("test_value".to_string()));
        assert!(provider.exists("test_key").unwrap());

        provider.delete("test_key").unwrap();
        assert_eq!(provider.get("test_key").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_provider_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let provider = FileCredentialsProvider::new(dir.path()).unwrap();
        provider.store("k", "v").unwrap();
        let mode = fs::metadata(dir.path().join(CREDENTIALS_FILE)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_master_key_is_stable() {
        let dir = tempdir().unwrap();
        let first = {
            let provider = FileCredentialsProvider::new(dir.path()).unwrap();
            CredentialService::with_provider(Box::new(provider)).master_key().unwrap()
        };
        let provider = FileCredentialsProvider::new(dir.path()).unwrap();
        let service = CredentialService::with_provider(Box::new(provider));
        assert_eq!(service.master_key().unwrap(), first);
        assert_eq!(service.provider_name(), "FileCredentialsProvider");
    }

    #[test]
    fn test_corrupt_master_key_is_rejected() {
        let provider = SessionCredentialsProvider::new();
        provider.store(MASTER_KEY, &STANDARD.encode([1u8; 8])).unwrap();
        let err = CredentialService::with_provider(Box::new(provider)).master_key().unwrap_err();
        assert!(matches!(err, PanelError::Crypto { .. }));
    }
}
