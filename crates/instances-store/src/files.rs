//! Two-file durable document store.
//!
//! Every save writes the staging file completely (and syncs it) before
//! copying it over the primary. An interrupted copy can leave the primary
//! truncated or stale, but never the staging file, so [`ConfigStore::load`]
//! always has a structurally valid fallback.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use instances_core::PersistedState;
use instances_core::constants::{CONFIG_FILE_NAME, STAGING_FILE_NAME};
use tracing::{debug, error, info, warn};

use crate::errors::Result;

/// Which file a loaded document came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// The primary file parsed cleanly.
    Primary,
    /// The primary was unusable and the staging copy was used.
    Staging,
    /// Neither file was usable; a default document was synthesized.
    Fresh,
}

/// Result of [`ConfigStore::load`].
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    /// The loaded (or synthesized) document.
    pub state: PersistedState,
    /// Where it came from.
    pub source: LoadSource,
}

/// Location of the primary and staging documents.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    primary: PathBuf,
    staging: PathBuf,
}

impl ConfigStore {
    /// Store rooted at `dir` using the standard file names.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            primary: dir.join(CONFIG_FILE_NAME),
            staging: dir.join(STAGING_FILE_NAME),
            dir,
        }
    }

    /// Directory holding both files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the primary document.
    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    /// Path of the staging document.
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Load the persisted document.
    ///
    /// Tries the primary, then the staging file. When both are unusable a
    /// default document is synthesized and written to both paths. Never
    /// fails: a default that cannot be written is still returned, with the
    /// write error logged.
    pub fn load(&self) -> LoadOutcome {
        let primary_err = match read_document(&self.primary) {
            Ok(state) => {
                debug!(path = %self.primary.display(), "loaded persisted state");
                return LoadOutcome {
                    state,
                    source: LoadSource::Primary,
                };
            }
            Err(e) => e,
        };

        let staging_err = match read_document(&self.staging) {
            Ok(state) => {
                warn!(
                    path = %self.primary.display(),
                    error = %primary_err,
                    "primary config unusable, falling back to staging copy"
                );
                info!(path = %self.staging.display(), "recovered persisted state from staging copy");
                return LoadOutcome {
                    state,
                    source: LoadSource::Staging,
                };
            }
            Err(e) => e,
        };

        if primary_err.is_not_found() && staging_err.is_not_found() {
            info!(dir = %self.dir.display(), "no persisted state, creating default");
        } else {
            error!(
                primary_error = %primary_err,
                staging_error = %staging_err,
                "both config files unusable, resetting to default"
            );
        }

        let state = PersistedState::default();
        if let Err(e) = self.save_now(&state) {
            error!(error = %e, "failed to write default config");
        }
        LoadOutcome {
            state,
            source: LoadSource::Fresh,
        }
    }

    /// Durably write `doc`: staging first (synced), then copy to primary.
    pub fn write_document(&self, doc: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let mut file = File::create(&self.staging)?;
        file.write_all(doc.as_bytes())?;
        file.sync_all()?;
        drop(file);

        let _ = fs::copy(&self.staging, &self.primary)?;
        Ok(())
    }

    /// Serialize and write `state` synchronously.
    pub fn save_now(&self, state: &PersistedState) -> Result<()> {
        self.write_document(&state.to_document()?)
    }
}

/// Why a single file could not be used.
#[derive(Debug)]
enum ReadFailure {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl ReadFailure {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == ErrorKind::NotFound)
    }
}

impl std::fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "read failed: {e}"),
            Self::Parse(e) => write!(f, "parse failed: {e}"),
        }
    }
}

fn read_document(path: &Path) -> std::result::Result<PersistedState, ReadFailure> {
    let text = fs::read_to_string(path).map_err(ReadFailure::Io)?;
    PersistedState::from_document(&text).map_err(ReadFailure::Parse)
}
