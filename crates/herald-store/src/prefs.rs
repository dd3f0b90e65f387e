//! The persisted preference mapping and its flat-file store.
//!
//! The mapping is a single JSON object with three fields. Every mutation
//! from the command surface is followed by [`PreferenceStore::save`],
//! which writes a fresh temporary file in the same directory and
//! atomically renames it over the old one, so readers only ever observe
//! the old or the new complete content.

use herald_types::{ChannelId, SoundName, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The whole persisted preference record.
///
/// Values are not validated against the catalog here: stale entries are
/// tolerated and fall through at resolution time, never purged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceMapping {
    /// Channel-scoped greeting sounds.
    #[serde(default)]
    pub channel_sounds: BTreeMap<ChannelId, SoundName>,
    /// User-scoped greeting sounds. Take precedence over channel sounds.
    #[serde(default)]
    pub user_sounds: BTreeMap<UserId, SoundName>,
    /// Fallback when neither a user nor a channel sound applies.
    #[serde(default)]
    pub default_sound: Option<SoundName>,
}

impl PreferenceMapping {
    /// Sets the greeting sound for a channel. In-memory only; persist
    /// with [`PreferenceStore::save`].
    pub fn set_channel_sound(&mut self, channel: ChannelId, sound: SoundName) {
        self.channel_sounds.insert(channel, sound);
    }

    /// Sets the greeting sound for a user. In-memory only; persist with
    /// [`PreferenceStore::save`].
    pub fn set_user_sound(&mut self, user: UserId, sound: SoundName) {
        self.user_sounds.insert(user, sound);
    }

    /// Sets the fallback sound. In-memory only; persist with
    /// [`PreferenceStore::save`].
    pub fn set_default_sound(&mut self, sound: SoundName) {
        self.default_sound = Some(sound);
    }

    pub fn channel_sound(&self, channel: ChannelId) -> Option<&SoundName> {
        self.channel_sounds.get(&channel)
    }

    pub fn user_sound(&self, user: UserId) -> Option<&SoundName> {
        self.user_sounds.get(&user)
    }
}

/// File-backed store for the preference mapping.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the mapping from disk.
    ///
    /// Fails soft: an absent, unreadable, or malformed file yields a
    /// fresh empty mapping and a log line. Callers never see an error.
    pub fn load(&self) -> PreferenceMapping {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.path.display(),
                    "preference file not found, starting with an empty mapping"
                );
                return PreferenceMapping::default();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "failed to read preference file, starting with an empty mapping: {}",
                    e
                );
                return PreferenceMapping::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "preference file is malformed, starting with an empty mapping: {}",
                    e
                );
                PreferenceMapping::default()
            }
        }
    }

    /// Persists the full mapping, replacing the file atomically.
    ///
    /// Returns `false` on any I/O failure; the caller's in-memory
    /// mapping is untouched either way, so it can retry or report.
    pub fn save(&self, mapping: &PreferenceMapping) -> bool {
        match self.write_atomic(mapping) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    "failed to persist preference mapping: {}",
                    e
                );
                false
            }
        }
    }

    fn write_atomic(&self, mapping: &PreferenceMapping) -> std::io::Result<()> {
        use std::io::Write;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        // Temp file in the destination directory so `persist` is a
        // same-filesystem rename.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let json = serde_json::to_vec_pretty(mapping)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
