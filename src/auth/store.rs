use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::{digest_hex, TokenPair};

const TIER_FILE_VERSION: u32 = 1;
const CREDENTIALS_FILE: &str = "credentials.toml";
const SESSION_FILE: &str = "session.toml";

/// Storage abstraction for the persisted token pair.
///
/// Pure persistence: no retries and no validation beyond shape. A `save` or
/// `clear` must be visible to the very next `load`.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, AuthError>;
    fn save(&self, pair: &TokenPair) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_civic_dir()
    }
}

/// File-backed token store split across two TOML tiers.
///
/// `credentials.toml` is the high-sensitivity tier (access and refresh token,
/// owner-only permissions). `session.toml` is the standard tier holding the
/// expiry together with a digest of the access token it describes.
///
/// # Example
/// ```no_run
/// use chrono::{Duration, Utc};
/// use civic_link::auth::{FileTokenStore, TokenPair, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// let pair = TokenPair::new("access", "refresh", Utc::now() + Duration::hours(1));
/// store.save(&pair)?;
/// # Ok::<(), civic_link::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_civic_dir(),
        }
    }

    fn credentials_path(&self) -> PathBuf {
        self.base_dir.join(CREDENTIALS_FILE)
    }

    fn session_path(&self) -> PathBuf {
        self.base_dir.join(SESSION_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, AuthError> {
        let Some(credentials) = read_tier::<CredentialsTier>(&self.credentials_path())? else {
            return Ok(None);
        };
        let session = read_tier::<SessionTier>(&self.session_path())?;

        // An expiry written for a different access token is not trusted.
        let expires_at = match session {
            Some(session) if session.access_digest == digest_hex(&credentials.access_token) => {
                session.expires_at
            }
            _ => {
                tracing::warn!("session tier does not match stored credentials; treating token as expired");
                DateTime::<Utc>::default()
            }
        };

        Ok(Some(TokenPair {
            access_token: credentials.access_token,
            refresh_token: credentials.refresh_token,
            expires_at,
        }))
    }

    fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let saved_at = Utc::now();
        let credentials = CredentialsTier {
            version: TIER_FILE_VERSION,
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            saved_at,
        };
        let session = SessionTier {
            version: TIER_FILE_VERSION,
            expires_at: pair.expires_at,
            access_digest: pair.access_digest(),
            saved_at,
        };
        atomic_write(&self.credentials_path(), toml::to_string(&credentials)?.as_bytes(), true)?;
        atomic_write(&self.session_path(), toml::to_string(&session)?.as_bytes(), false)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        remove_if_present(&self.credentials_path())?;
        remove_if_present(&self.session_path())
    }
}

/// In-process token store. Tokens do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<TokenPair>, AuthError> {
        Ok(self
            .pair
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        *self.pair.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.pair.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialsTier {
    version: u32,
    access_token: String,
    refresh_token: String,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionTier {
    version: u32,
    expires_at: DateTime<Utc>,
    access_digest: String,
    saved_at: DateTime<Utc>,
}

fn read_tier<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, AuthError> {
    let raw = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(AuthError::Io(err.to_string())),
    };
    Ok(Some(toml::from_str(&raw)?))
}

fn remove_if_present(path: &Path) -> Result<(), AuthError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AuthError::Io(err.to_string())),
    }
}

fn atomic_write(path: &Path, data: &[u8], sensitive: bool) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| AuthError::Io(format!("Token path {} has no file name", path.display())))?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        if sensitive {
            options.mode(0o600);
        }
    }

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    {
        if sensitive {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    #[cfg(not(unix))]
    let _ = sensitive;

    Ok(())
}

fn default_civic_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".civic"))
        .unwrap_or_else(|| PathBuf::from(".civic"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileTokenStore) {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(TokenStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    fn sample_pair() -> TokenPair {
        TokenPair::new("access", "refresh", Utc::now() + Duration::hours(1))
    }

    #[test]
    fn pair_round_trip_works() {
        let (_dir, store) = temp_store();
        let pair = sample_pair();
        store.save(&pair).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token, "refresh");
        assert_eq!(loaded.expires_at.timestamp(), pair.expires_at.timestamp());
    }

    #[test]
    fn tokens_and_expiry_live_in_separate_tiers() {
        let (dir, store) = temp_store();
        store.save(&sample_pair()).unwrap();

        let credentials = fs::read_to_string(dir.path().join(CREDENTIALS_FILE)).unwrap();
        let session = fs::read_to_string(dir.path().join(SESSION_FILE)).unwrap();
        assert!(credentials.contains("refresh_token"));
        assert!(!credentials.contains("expires_at"));
        assert!(session.contains("expires_at"));
        assert!(!session.contains("refresh"));
    }

    #[cfg(unix)]
    #[test]
    fn credentials_tier_is_owner_only() {
        let (dir, store) = temp_store();
        store.save(&sample_pair()).unwrap();
        let mode = fs::metadata(dir.path().join(CREDENTIALS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn mismatched_session_tier_reads_as_expired() {
        let (dir, store) = temp_store();
        store.save(&sample_pair()).unwrap();
        let session_only = FileTokenStore::new(TokenStoreConfig::new(dir.path().join("other")));
        session_only
            .save(&TokenPair::new("different", "refresh", Utc::now() + Duration::hours(2)))
            .unwrap();
        fs::copy(
            dir.path().join("other").join(SESSION_FILE),
            dir.path().join(SESSION_FILE),
        )
        .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert!(loaded.is_expired(Duration::zero()));
    }

    #[test]
    fn clear_removes_both_tiers() {
        let (dir, store) = temp_store();
        store.save(&sample_pair()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!dir.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn clear_without_tokens_is_noop() {
        let (_dir, store) = temp_store();
        store.clear().unwrap();
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample_pair()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().access_token, "access");
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
