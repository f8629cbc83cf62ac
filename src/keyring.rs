//! Credential storage for the model API key
//!
//! Stores credentials as JSON in a single system keychain entry. When the
//! keychain is disabled (`AMY_DISABLE_KEYRING=1`, or under test) a local
//! `credentials.json` with 0600 permissions is used instead.

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

const KEYRING_SERVICE: &str = "amy-credentials";
const KEYRING_USERNAME: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<StoredCredentials>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }

    let disabled_by_env = matches!(
        std::env::var("AMY_DISABLE_KEYRING")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    );
    if disabled_by_env {
        return true;
    }

    // A usable local credentials file wins over the keychain to avoid prompts.
    matches!(
        fallback_credentials_path().and_then(|p| read_credentials_file(&p)),
        Ok(StoredCredentials { api_key: Some(_) })
    )
}

/// Human-friendly credential backend label used in CLI messages.
pub fn credentials_store_label() -> &'static str {
    if keyring_disabled() {
        "local credentials file"
    } else {
        "system keychain"
    }
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

fn fallback_credentials_path() -> KeyringResult<PathBuf> {
    if cfg!(test) {
        return Ok(std::env::temp_dir().join("amy-test-credentials.json"));
    }

    crate::config::config_dir()
        .map(|p| p.join("credentials.json"))
        .ok_or_else(|| "Could not determine credentials file path".to_string())
}

fn read_credentials_file(path: &Path) -> KeyringResult<StoredCredentials> {
    if !path.exists() {
        return Ok(StoredCredentials::default());
    }
    let json = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read credentials file '{}': {}",
            path.display(),
            e
        )
    })?;
    serde_json::from_str(&json).map_err(|e| {
        format!(
            "Failed to parse credentials file '{}': {}",
            path.display(),
            e
        )
    })
}

fn write_credentials_file(path: &Path, creds: &StoredCredentials) -> KeyringResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            format!(
                "Failed to create credentials directory '{}': {}",
                parent.display(),
                e
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }

    let content = serde_json::to_string(creds)
        .map_err(|e| format!("Failed to serialize credentials: {}", e))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut tmp_file = fs::File::create(&tmp_path).map_err(|e| {
        format!(
            "Failed to create temp credentials file '{}': {}",
            tmp_path.display(),
            e
        )
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tmp_file.set_permissions(fs::Permissions::from_mode(0o600));
    }
    tmp_file.write_all(content.as_bytes()).map_err(|e| {
        format!(
            "Failed to write credentials file '{}': {}",
            tmp_path.display(),
            e
        )
    })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        format!(
            "Failed to finalize credentials file '{}': {}",
            path.display(),
            e
        )
    })
}

/// Warn about keychain errors only once per session
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!(context, error = err, "credential store unavailable");
    eprintln!(
        "  Warning: Couldn't access {} for {}: {}",
        credentials_store_label(),
        context,
        err
    );
    eprintln!("  Tip: To bypass keychain prompts: export AMY_DISABLE_KEYRING=1");
    eprintln!("  Tip: You can also set OPENAI_API_KEY to bypass the credential store.");
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return read_credentials_file(&fallback_credentials_path()?);
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse credentials: {}", e))
        }
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn write_credentials(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return write_credentials_file(&fallback_credentials_path()?, creds);
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    let json = serde_json::to_string(creds)
        .map_err(|e| format!("Failed to serialize credentials: {}", e))?;
    entry.set_password(&json).map_err(|e| e.to_string())
}

fn read_credentials_cached() -> KeyringResult<StoredCredentials> {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(ref creds) = *guard {
        return Ok(creds.clone());
    }

    let creds = read_credentials_uncached()?;
    *guard = Some(creds.clone());
    Ok(creds)
}

fn update_cache(creds: StoredCredentials) {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(creds);
}

// ============================================================================
// Public API
// ============================================================================

/// Get the model API key from the credential store
pub fn get_api_key() -> KeyringResult<Option<String>> {
    Ok(read_credentials_cached()?.api_key)
}

/// Set the model API key in the credential store
pub fn set_api_key(key: &str) -> Result<(), String> {
    let mut creds = read_credentials_cached().unwrap_or_default();
    creds.api_key = Some(key.to_string());
    write_credentials(&creds)?;
    update_cache(creds);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stored_credentials_omits_missing_key() {
        let json = serde_json::to_string(&StoredCredentials::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_stored_credentials_deserialize_empty() {
        let parsed: StoredCredentials = serde_json::from_str("{}").unwrap();
        assert!(parsed.api_key.is_none());
    }

    #[test]
    fn test_credentials_store_label_uses_file_backend_in_tests() {
        assert_eq!(credentials_store_label(), "local credentials file");
    }

    #[test]
    fn test_credentials_file_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("amy").join("credentials.json");

        assert_eq!(read_credentials_file(&path).unwrap(), StoredCredentials::default());

        let creds = StoredCredentials {
            api_key: Some("sk-test-key".to_string()),
        };
        write_credentials_file(&path, &creds).unwrap();
        assert_eq!(read_credentials_file(&path).unwrap(), creds);
        assert!(!path.with_extension("json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_corrupt_credentials_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("credentials.json");
        fs::write(&path, "not json").unwrap();
        assert!(read_credentials_file(&path).is_err());
    }
}
