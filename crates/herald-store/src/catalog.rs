//! Directory-backed catalog of greeting sounds.
//!
//! Assets live as `<name>.mp3` directly under the catalog directory.
//! Listing never fails: a missing or unreadable directory logs and
//! reads as empty. Creation is the only mutation; assets are immutable
//! once written and deletion is not supported.

use herald_types::{InvalidSoundName, SoundName, SOUND_EXTENSION};
use rand::seq::SliceRandom;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when adding an asset to the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// An asset with this name is already present; overwriting is not
    /// allowed.
    #[error("sound already exists: {0}")]
    AlreadyExists(SoundName),

    /// The uploaded bytes are not an MP3 container.
    #[error("not a supported audio format (expected MP3)")]
    InvalidFormat,

    /// The requested name cannot be used as a filename.
    #[error("invalid sound name: {0}")]
    InvalidName(#[from] InvalidSoundName),

    /// Filesystem failure while writing the asset.
    #[error("failed to write sound asset: {0}")]
    Io(#[from] std::io::Error),
}

/// The sound catalog: a thin view over one asset directory.
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    dir: PathBuf,
}

impl SoundCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory assets are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists all sound names, sorted.
    ///
    /// Never fails: a missing or unreadable directory logs a warning and
    /// returns an empty list. Files without the `.mp3` extension or with
    /// unusable stems are skipped.
    pub fn list(&self) -> Vec<SoundName> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    "failed to read sound directory, catalog reads as empty: {}",
                    e
                );
                return Vec::new();
            }
        };

        let mut names: Vec<SoundName> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(SOUND_EXTENSION))
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| SoundName::new(stem).ok())
            })
            .collect();
        names.sort();
        names
    }

    /// Picks one sound uniformly at random, or `None` if the catalog is
    /// empty.
    pub fn random(&self) -> Option<SoundName> {
        let names = self.list();
        names.choose(&mut rand::thread_rng()).cloned()
    }

    /// Whether an asset with this name is currently present.
    pub fn exists(&self, name: &SoundName) -> bool {
        self.path_for(name).is_file()
    }

    /// The full path an asset with this name lives (or would live) at.
    pub fn path_for(&self, name: &SoundName) -> PathBuf {
        self.dir.join(name.file_name())
    }

    /// Writes a new asset under `name`.
    ///
    /// Rejects duplicates (`AlreadyExists`) and bytes that are not an
    /// MP3 container (`InvalidFormat`). No partial state is left behind
    /// on failure: validation happens before the file is created, and
    /// creation uses `create_new` so a concurrent duplicate loses
    /// cleanly.
    pub fn add(&self, name: &SoundName, bytes: &[u8]) -> Result<(), CatalogError> {
        let is_mp3 = infer::get(bytes).is_some_and(|kind| kind.mime_type() == "audio/mpeg");
        if !is_mp3 {
            return Err(CatalogError::InvalidFormat);
        }
        if self.exists(name) {
            return Err(CatalogError::AlreadyExists(name.clone()));
        }

        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(name);
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CatalogError::AlreadyExists(name.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        file.sync_all()?;

        tracing::info!(sound = %name, path = %path.display(), "added sound asset");
        Ok(())
    }
}
