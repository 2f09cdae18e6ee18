//! Persisted session tokens.
//!
//! The session store only ever talks to a [`TokenStore`]; where the tokens
//! actually live is chosen by configuration:
//! - [`FileTokenStore`]: `session.json` in the cache directory
//! - [`KeyringTokenStore`]: the OS keychain
//! - [`MemoryTokenStore`]: process memory only

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name
const SERVICE_NAME: &str = "learnplus";

/// Keychain account holding the serialized session
const KEYRING_ACCOUNT: &str = "session";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, refresh_token: Option<String>, username: Option<String>) -> Self {
        Self {
            token,
            refresh_token,
            username,
            created_at: Utc::now(),
        }
    }

    /// Minutes since the current access token was issued
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes().max(0)
    }

    /// Whether the access token was issued at least `max_age` ago.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        (Utc::now() - self.created_at)
            .to_std()
            .is_ok_and(|age| age >= max_age)
    }
}

// Tokens stay out of logs.
impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Storage capability for the session tokens: get, set, clear.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Result<Option<SessionData>>;

    fn set(&self, data: &SessionData) -> Result<()>;

    /// Remove any stored session. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

/// Session persisted as JSON in a cache directory.
pub struct FileTokenStore {
    cache_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<SessionData>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data))
    }

    fn set(&self, data: &SessionData) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        write_private(&path, contents.as_bytes()).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &std::path::Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Session kept in the OS keychain as a JSON blob.
///
/// The keychain entry is created once and reused for every call. Backends
/// without real persistence (the keyring mock) only keep a credential on
/// the entry that stored it.
pub struct KeyringTokenStore {
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new() -> Result<Self> {
        Self::with_account(KEYRING_ACCOUNT)
    }

    /// Use a separate keychain entry, e.g. one per backend.
    pub fn with_account(account: &str) -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self) -> Result<Option<SessionData>> {
        match self.entry.get_password() {
            Ok(secret) => {
                let data = serde_json::from_str(&secret)
                    .context("Failed to parse session from keychain")?;
                Ok(Some(data))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn set(&self, data: &SessionData) -> Result<()> {
        let secret = serde_json::to_string(data)?;
        self.entry
            .set_password(&secret)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

/// Session held in memory only; nothing survives the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    data: Mutex<Option<SessionData>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(data: SessionData) -> Self {
        Self {
            data: Mutex::new(Some(data)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<SessionData>> {
        Ok(self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))?
            .clone())
    }

    fn set(&self, data: &SessionData) -> Result<()> {
        *self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))? = Some(data.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionData {
        SessionData::new(
            "access-1".to_string(),
            Some("refresh-1".to_string()),
            Some("ada".to_string()),
        )
    }

    #[test]
    fn test_file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));

        assert!(store.get().unwrap().is_none());
        let data = sample();
        store.set(&data).unwrap();
        assert_eq!(store.get().unwrap(), Some(data));

        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.set(&sample()).unwrap();
        let mode = std::fs::metadata(dir.path().join(SESSION_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        assert!(store.get().is_err());
    }

    #[test]
    fn test_legacy_session_without_refresh_token_parses() {
        let json = r#"{"token":"t","created_at":"2026-01-01T00:00:00Z"}"#;
        let data: SessionData = serde_json::from_str(json).unwrap();
        assert_eq!(data.token, "t");
        assert!(data.refresh_token.is_none());
        assert!(data.username.is_none());
    }

    #[test]
    fn test_is_older_than() {
        let mut data = sample();
        assert!(!data.is_older_than(Duration::from_secs(60)));

        data.created_at = Utc::now() - chrono::Duration::minutes(70);
        assert!(data.is_older_than(Duration::from_secs(55 * 60)));
        assert!(!data.is_older_than(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("access-1"));
        assert!(!rendered.contains("refresh-1"));
        assert!(rendered.contains("ada"));
    }

    #[test]
    fn test_keyring_store_roundtrip_and_clear() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let store = KeyringTokenStore::with_account("roundtrip").unwrap();

        assert!(store.get().unwrap().is_none());
        let data = sample();
        store.set(&data).unwrap();
        assert_eq!(store.get().unwrap(), Some(data));

        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::new();
        assert!(store.get().unwrap().is_none());
        store.set(&sample()).unwrap();
        assert_eq!(store.get().unwrap().map(|s| s.token), Some("access-1".to_string()));
        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
    }
}
