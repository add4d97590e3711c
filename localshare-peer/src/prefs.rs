use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::warn;

pub const LOCAL_NAME_KEY: &str = "localPeerName";
pub const PREFS_FILE_NAME: &str = "prefs.json";

/// Preference files are expected to be tiny; anything larger is treated as
/// corrupt instead of being read into memory.
pub const MAX_PREFS_BYTES: u64 = 64 * 1024;

#[derive(Debug)]
pub enum PrefsError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
    Serialize(serde_json::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for PrefsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefsError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            PrefsError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            PrefsError::Read(e) => write!(f, "read failed: {e}"),
            PrefsError::Parse(e) => write!(f, "parse failed: {e}"),
            PrefsError::Serialize(e) => write!(f, "serialize failed: {e}"),
            PrefsError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            PrefsError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for PrefsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrefsError::Metadata(e) | PrefsError::Read(e) => Some(e),
            PrefsError::WriteTmp(e) | PrefsError::Rename(e) => Some(e),
            PrefsError::Parse(e) | PrefsError::Serialize(e) => Some(e),
            PrefsError::TooLarge { .. } => None,
        }
    }
}

/// A flat string key-value store outliving a single manager.
pub trait PreferenceStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, PrefsError>;
    fn store(&self, key: &str, value: &str) -> Result<(), PrefsError>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let prefs = Self::new();
        prefs
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        prefs
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self, key: &str) -> Result<Option<String>, PrefsError> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for std::sync::Arc<S> {
    fn load(&self, key: &str) -> Result<Option<String>, PrefsError> {
        (**self).load(key)
    }

    fn store(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        (**self).store(key, value)
    }
}

pub type SavedPreferences = BTreeMap<String, String>;

/// JSON object on disk, rewritten whole on every `store`.
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
    path: PathBuf,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_location() -> Self {
        Self::new(default_prefs_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn load(&self, key: &str) -> Result<Option<String>, PrefsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut saved = load_prefs_from_path(&self.path)?;
        Ok(saved.remove(key))
    }

    /// A corrupt or oversized file is replaced rather than blocking the write.
    fn store(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        let mut saved = if self.path.exists() {
            match load_prefs_from_path(&self.path) {
                Ok(saved) => saved,
                Err(err @ (PrefsError::Parse(_) | PrefsError::TooLarge { .. })) => {
                    warn!(
                        path = %self.path.display(),
                        "discarding unreadable preferences: {}", err
                    );
                    SavedPreferences::new()
                }
                Err(err) => return Err(err),
            }
        } else {
            SavedPreferences::new()
        };
        saved.insert(key.to_owned(), value.to_owned());
        save_prefs_with_retry(&self.path, &saved)
    }
}

pub fn prefs_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("LOCALSHARE_HOME") {
        return PathBuf::from(home);
    }
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .or_else(|| std::env::var_os("LOCALAPPDATA").map(PathBuf::from));
    match base {
        Some(base) => base.join("localshare"),
        None => PathBuf::from("."),
    }
}

pub fn default_prefs_path() -> PathBuf {
    prefs_dir().join(PREFS_FILE_NAME)
}

pub fn parse_prefs_json(data: &str) -> Result<SavedPreferences, serde_json::Error> {
    serde_json::from_str::<SavedPreferences>(data)
}

pub fn load_prefs_from_path(path: &Path) -> Result<SavedPreferences, PrefsError> {
    let meta = fs::metadata(path).map_err(PrefsError::Metadata)?;
    if meta.len() > MAX_PREFS_BYTES {
        return Err(PrefsError::TooLarge {
            size: meta.len(),
            max: MAX_PREFS_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(PrefsError::Read)?;
    parse_prefs_json(&data).map_err(PrefsError::Parse)
}

pub fn save_prefs_to_path(path: &Path, prefs: &SavedPreferences) -> Result<(), PrefsError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(PrefsError::WriteTmp)?;
    }

    let tmp = tmp_path_for(path);
    let payload = serde_json::to_string_pretty(prefs).map_err(PrefsError::Serialize)?;
    if let Err(err) = fs::write(&tmp, payload.as_bytes()) {
        let _ = fs::remove_file(&tmp);
        return Err(PrefsError::WriteTmp(err));
    }

    // rename replaces the target in place, so the old file survives until then
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(PrefsError::Rename(err));
    }
    Ok(())
}

/// Sibling temp file unique per process and per write.
fn tmp_path_for(path: &Path) -> PathBuf {
    static NEXT_TMP: AtomicU64 = AtomicU64::new(0);
    let seq = NEXT_TMP.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PREFS_FILE_NAME.to_owned());
    path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()))
}

pub fn save_prefs_with_retry(path: &Path, prefs: &SavedPreferences) -> Result<(), PrefsError> {
    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let mut attempt = 1;
    loop {
        match save_prefs_to_path(path, prefs) {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
            Err(_) => {
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(backoff_ms));
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrips_values() {
        let prefs = MemoryPreferences::new();
        assert_eq!(prefs.load(LOCAL_NAME_KEY).unwrap(), None);
        prefs.store(LOCAL_NAME_KEY, "Kitchen Laptop").unwrap();
        assert_eq!(
            prefs.load(LOCAL_NAME_KEY).unwrap().as_deref(),
            Some("Kitchen Laptop")
        );
    }

    #[test]
    fn parse_accepts_flat_object() {
        let saved = parse_prefs_json(r#"{"localPeerName":"Desk"}"#).unwrap();
        assert_eq!(saved.get(LOCAL_NAME_KEY).map(String::as_str), Some("Desk"));
    }

    #[test]
    fn tmp_paths_are_unique_siblings() {
        let target = Path::new("/var/lib/localshare/prefs.json");
        let first = tmp_path_for(target);
        let second = tmp_path_for(target);
        assert_ne!(first, second);
        assert_eq!(first.parent(), target.parent());
        assert!(first.to_string_lossy().ends_with(".tmp"));
    }

    #[test]
    fn parse_rejects_nested_values() {
        assert!(parse_prefs_json(r#"{"localPeerName":{"nested":true}}"#).is_err());
    }
}
