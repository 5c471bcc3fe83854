use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Option names written to the preference file.
pub mod keys {
    pub const OUTPUT_DIR: &str = "output_dir";
    pub const FORMAT: &str = "format";
    pub const AUDIO_BITRATE: &str = "audio_bitrate";
    pub const RESOLUTION: &str = "resolution";
    pub const PLAYLIST: &str = "playlist";
    pub const EMBED_METADATA: &str = "embed_metadata";
    pub const SAVE_THUMBNAIL: &str = "save_thumbnail";
    pub const OPEN_FOLDER: &str = "open_folder_when_done";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for PrefValue {
    fn from(v: bool) -> Self {
        PrefValue::Bool(v)
    }
}

impl From<i64> for PrefValue {
    fn from(v: i64) -> Self {
        PrefValue::Int(v)
    }
}

impl From<u32> for PrefValue {
    fn from(v: u32) -> Self {
        PrefValue::Int(i64::from(v))
    }
}

impl From<&str> for PrefValue {
    fn from(v: &str) -> Self {
        PrefValue::Str(v.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(v: String) -> Self {
        PrefValue::Str(v)
    }
}

/// Flat option name -> scalar mapping. Last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceSnapshot {
    values: BTreeMap<String, PrefValue>,
}

impl PreferenceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PrefValue> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(PrefValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(PrefValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(PrefValue::Int(i)) => *i,
            _ => default,
        }
    }

    /// Returns whether the stored value changed.
    pub fn set(&mut self, key: &str, value: impl Into<PrefValue>) -> bool {
        let value = value.into();
        if self.values.get(key) == Some(&value) {
            return false;
        }
        self.values.insert(key.to_string(), value);
        true
    }

    /// Keeps the scalar entries of a JSON object and drops everything else.
    fn from_json(value: serde_json::Value) -> Self {
        let serde_json::Value::Object(map) = value else {
            return Self::default();
        };
        let values = map
            .into_iter()
            .filter_map(|(k, v)| {
                let v = match v {
                    serde_json::Value::Bool(b) => PrefValue::Bool(b),
                    serde_json::Value::Number(n) => PrefValue::Int(n.as_i64()?),
                    serde_json::Value::String(s) => PrefValue::Str(s),
                    _ => return None,
                };
                Some((k, v))
            })
            .collect();
        Self { values }
    }
}

/// Best-effort persistence of a [`PreferenceSnapshot`] to one JSON file.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// `<config dir>/brejax/preferences.json`, or memory-only when the
    /// platform has no config dir.
    pub fn user() -> Self {
        let path = dirs::config_dir().map(|p| p.join("brejax").join("preferences.json"));
        if path.is_none() {
            log::warn!("no per-user config directory; preferences will not be saved");
        }
        Self { path }
    }

    /// Never fails: unreadable or malformed files yield an empty snapshot.
    pub fn load(&self) -> PreferenceSnapshot {
        let Some(path) = &self.path else {
            return PreferenceSnapshot::default();
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PreferenceSnapshot::default();
            }
            Err(e) => {
                log::warn!("could not read {}: {}", path.display(), e);
                return PreferenceSnapshot::default();
            }
        };
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => PreferenceSnapshot::from_json(value),
            Err(e) => {
                log::warn!("ignoring corrupt preferences {}: {}", path.display(), e);
                PreferenceSnapshot::default()
            }
        }
    }

    /// Never fails: write errors are logged and dropped.
    pub fn save(&self, snapshot: &PreferenceSnapshot) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_json(path, snapshot) {
            log::warn!("could not save preferences to {}: {}", path.display(), e);
        }
    }
}

fn write_json(path: &Path, snapshot: &PreferenceSnapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("nope.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_gives_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(PreferenceStore::new(&path).load().is_empty());

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(PreferenceStore::new(&path).load().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("nested").join("prefs.json"));

        let mut snap = PreferenceSnapshot::default();
        snap.set(keys::FORMAT, "mp3");
        snap.set(keys::AUDIO_BITRATE, 320u32);
        snap.set(keys::PLAYLIST, true);
        store.save(&snap);

        let loaded = store.load();
        assert_eq!(loaded, snap);
        assert_eq!(loaded.get_str(keys::FORMAT), Some("mp3"));
        assert_eq!(loaded.get_int(keys::AUDIO_BITRATE, 0), 320);
        assert!(loaded.get_bool(keys::PLAYLIST, false));
    }

    #[test]
    fn non_scalar_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(
            &path,
            r#"{"format": "flac", "volume": 0.5, "list": [1], "playlist": false}"#,
        )
        .unwrap();
        let snap = PreferenceStore::new(&path).load();
        assert_eq!(snap.get_str(keys::FORMAT), Some("flac"));
        assert!(snap.get("volume").is_none());
        assert!(snap.get("list").is_none());
        assert!(!snap.get_bool(keys::PLAYLIST, true));
    }

    #[test]
    fn save_to_unwritable_location_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        // Parent is a regular file, so create_dir_all fails.
        let store = PreferenceStore::new(blocker.join("prefs.json"));
        store.save(&PreferenceSnapshot::default());
        assert!(store.load().is_empty());
    }

    #[test]
    fn typed_getters_fall_back_on_mismatch() {
        let mut snap = PreferenceSnapshot::default();
        assert!(snap.set(keys::PLAYLIST, "yes"));
        assert!(!snap.set(keys::PLAYLIST, "yes"));
        assert!(snap.get_bool(keys::PLAYLIST, true));
        assert_eq!(snap.get_int(keys::PLAYLIST, 7), 7);
    }
}
