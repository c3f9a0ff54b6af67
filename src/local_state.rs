//! Small persisted key/value state: the colour theme and the last open chat.
//!
//! [`FileStore`] keeps the map in a JSON file that is rewritten on every
//! change.  [`MemoryStore`] keeps it in memory only.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::SessionId;

/// Key holding the colour theme.
pub const THEME_KEY: &str = "theme";

/// Key holding the id of the last active session.
pub const LAST_CHAT_ID_KEY: &str = "lastChatId";

/// Persisted string key/value pairs.
pub trait LocalStore: Send + Sync {
    /// The value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Forget `key`.
    fn remove(&self, key: &str) -> Result<()>;

    /// The last active session id, when one is stored and parses.
    fn last_chat_id(&self) -> Option<SessionId> {
        self.get(LAST_CHAT_ID_KEY)?.parse().ok()
    }

    /// Remember the active session id.
    fn set_last_chat_id(&self, session_id: SessionId) -> Result<()> {
        self.set(LAST_CHAT_ID_KEY, &session_id.to_string())
    }

    /// The stored theme, defaulting to light.
    fn theme(&self) -> Theme {
        self.get(THEME_KEY)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Persist the theme.
    fn set_theme(&self, theme: Theme) -> Result<()> {
        self.set(THEME_KEY, &theme.to_string())
    }
}

/// Colour theme.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Theme {
    /// Light background.
    #[default]
    Light,
    /// Dark background.
    Dark,
}

impl Theme {
    /// The other theme.
    pub fn toggle(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(Error::validation(
                format!("unknown theme {s:?}"),
                Some(THEME_KEY.to_string()),
            )),
        }
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// A missing or unreadable file starts empty; the file and its parent
/// directory are created on the first write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt state file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// `$HOME/.docchat/state.json`, or `.docchat/state.json` without a home.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(".docchat").join("state.json")
    }

    /// Where the store lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| Error::io(format!("cannot create {}", parent.display()), err))?;
        }
        let bytes = serde_json::to_vec_pretty(values)?;
        std::fs::write(&self.path, bytes)
            .map_err(|err| Error::io(format!("cannot write {}", self.path.display()), err))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = lock(&self.values);
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = lock(&self.values);
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_toggle_and_parse() {
        assert_eq!(Theme::Light.toggle(), Theme::Dark);
        assert_eq!(Theme::Dark.toggle(), Theme::Light);
        assert_eq!("DARK".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("sepia".parse::<Theme>().is_err());
    }

    #[test]
    fn memory_store_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.theme(), Theme::Light);
        assert_eq!(store.last_chat_id(), None);
        store.set_last_chat_id(42).unwrap();
        assert_eq!(store.last_chat_id(), Some(42));
        store.remove(LAST_CHAT_ID_KEY).unwrap();
        assert_eq!(store.last_chat_id(), None);
    }

    #[test]
    fn garbage_last_chat_id_is_ignored() {
        let store = MemoryStore::new();
        store.set(LAST_CHAT_ID_KEY, "abc").unwrap();
        assert_eq!(store.last_chat_id(), None);
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("docchat-state-{}", std::process::id()));
        let path = dir.join("nested").join("state.json");
        {
            let store = FileStore::open(&path);
            store.set_theme(Theme::Dark).unwrap();
            store.set_last_chat_id(7).unwrap();
        }
        let store = FileStore::open(&path);
        assert_eq!(store.theme(), Theme::Dark);
        assert_eq!(store.last_chat_id(), Some(7));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
