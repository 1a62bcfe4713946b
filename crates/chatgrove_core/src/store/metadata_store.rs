//! Durable JSON persistence for [`OrganizationState`].
//!
//! # Responsibility
//! - Serialize the whole organization state to one document, atomically.
//! - Load with a fallback chain: primary file, backup sibling, fresh state.
//!
//! # Invariants
//! - `save` copies the committed file to the `.backup` sibling before
//!   writing, writes through a same-directory `.tmp` sibling, and renames
//!   atomically; any failure before the rename leaves the committed file
//!   untouched.
//! - `load` never fails on a missing or corrupt file; it fails only on a
//!   document whose schema version is newer than this build understands.
//! - The committed file carries owner-only permissions on unix.

use crate::model::state::{OrganizationState, SCHEMA_VERSION};
use log::{info, warn};
use serde::de::Error as _;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix appended to the companion content file's stem to derive the
/// organization document's name.
pub const ORGANIZATION_FILE_SUFFIX: &str = "_organization.json";

const BACKUP_SUFFIX: &str = ".backup";
const TEMP_SUFFIX: &str = ".tmp";

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from organization-state persistence.
#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure with the path it happened on.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Document (de)serialization failure.
    Serialize(serde_json::Error),
    /// Stored document was written by a newer build than this one.
    UnsupportedSchemaVersion { file_version: String },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "storage I/O on {}: {source}", path.display()),
            Self::Serialize(err) => write!(f, "organization document serialization: {err}"),
            Self::UnsupportedSchemaVersion { file_version } => write!(
                f,
                "document schema version {file_version} is newer than supported {SCHEMA_VERSION}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

/// Storage contract for one organization document.
pub trait StateStore {
    /// Loads the document, recovering from corruption where possible.
    fn load(&self) -> StoreResult<OrganizationState>;
    /// Persists the document durably and atomically.
    fn save(&self, state: &OrganizationState) -> StoreResult<()>;
}

/// JSON-file-backed store with atomic writes and backup recovery.
pub struct JsonMetadataStore {
    file_path: PathBuf,
    backup_path: PathBuf,
    temp_path: PathBuf,
}

impl JsonMetadataStore {
    /// Creates a store over an explicit document path.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let backup_path = sibling_with_suffix(&file_path, BACKUP_SUFFIX);
        let temp_path = sibling_with_suffix(&file_path, TEMP_SUFFIX);
        Self {
            file_path,
            backup_path,
            temp_path,
        }
    }

    /// Derives the document path from a companion content file:
    /// `conversations.json` organizes into `conversations_organization.json`
    /// beside it.
    pub fn for_content_file(content_path: &Path) -> Self {
        let stem = content_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("conversations");
        Self::new(content_path.with_file_name(format!("{stem}{ORGANIZATION_FILE_SUFFIX}")))
    }

    /// Path of the committed document.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Path of the pre-save backup sibling.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Parses one candidate file into state, gating on schema version.
    fn read_state(&self, path: &Path) -> StoreResult<OrganizationState> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut state: OrganizationState = serde_json::from_str(&raw)?;

        if !OrganizationState::is_recognized_version(&state.version) {
            return Err(StoreError::UnsupportedSchemaVersion {
                file_version: state.version,
            });
        }
        if state.version != SCHEMA_VERSION {
            // Older documents already got their missing fields defaulted
            // during deserialization; restamp to the current version.
            info!(
                "event=schema_upgrade module=store status=ok from={} to={SCHEMA_VERSION}",
                state.version
            );
            state.version = SCHEMA_VERSION.to_string();
        }

        if state.tree_nodes.iter().any(|(key, node)| key != &node.id) {
            return Err(StoreError::Serialize(serde_json::Error::custom(
                "tree_nodes key does not match contained node id",
            )));
        }
        Ok(state)
    }
}

impl StateStore for JsonMetadataStore {
    fn load(&self) -> StoreResult<OrganizationState> {
        if !self.file_path.exists() {
            info!(
                "event=load_state module=store status=fresh path={}",
                self.file_path.display()
            );
            return Ok(OrganizationState::new());
        }

        match self.read_state(&self.file_path) {
            Ok(state) => Ok(state),
            // A future-version document must surface, not be misread or
            // silently replaced.
            Err(err @ StoreError::UnsupportedSchemaVersion { .. }) => Err(err),
            Err(err) => {
                warn!(
                    "event=load_state module=store status=corrupt path={} error={err}",
                    self.file_path.display()
                );
                match self.read_state(&self.backup_path) {
                    Ok(state) => {
                        info!(
                            "event=load_state module=store status=recovered path={}",
                            self.backup_path.display()
                        );
                        Ok(state)
                    }
                    Err(err @ StoreError::UnsupportedSchemaVersion { .. }) => Err(err),
                    Err(backup_err) => {
                        warn!(
                            "event=load_state module=store status=reset path={} error={backup_err}",
                            self.backup_path.display()
                        );
                        Ok(OrganizationState::new())
                    }
                }
            }
        }
    }

    fn save(&self, state: &OrganizationState) -> StoreResult<()> {
        if self.file_path.exists() {
            fs::copy(&self.file_path, &self.backup_path).map_err(|source| StoreError::Io {
                path: self.backup_path.clone(),
                source,
            })?;
        }

        let document = serde_json::to_string_pretty(state)?;

        let mut file = fs::File::create(&self.temp_path).map_err(|source| StoreError::Io {
            path: self.temp_path.clone(),
            source,
        })?;
        file.write_all(document.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|source| StoreError::Io {
                path: self.temp_path.clone(),
                source,
            })?;
        drop(file);

        fs::rename(&self.temp_path, &self.file_path).map_err(|source| StoreError::Io {
            path: self.file_path.clone(),
            source,
        })?;
        restrict_permissions(&self.file_path)?;

        info!(
            "event=save_state module=store status=ok path={} nodes={}",
            self.file_path.display(),
            state.node_count()
        );
        Ok(())
    }
}

/// Appends a suffix to the full file name, keeping the directory.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StoreResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StoreResult<()> {
    Ok(())
}
