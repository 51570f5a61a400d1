//! Reader and parser for Vagrant's machine index.
//!
//! Vagrant records every machine it knows about in a single JSON file at
//! `<VAGRANT_HOME>/data/machine-index/index`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "machines": {
//!     "<machine-id>": {
//!       "state": "running",
//!       "vagrantfile_path": "/home/dev/project",
//!       "name": "default"
//!     }
//!   }
//! }
//! ```
//!
//! [`parse_index`] is the only place that knows about the file format. It
//! reads the `version` field and dispatches on [`IndexVersion`]; adding a new
//! format means adding a variant there and nothing else.
//!
//! # Example
//!
//! ```no_run
//! use vagrant_indicator::config::Config;
//! use vagrant_indicator::index::get_index;
//!
//! let config = Config::from_env()?;
//! for machine in &get_index(&config)? {
//!     println!("{machine}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, MACHINE_INDEX_PATH};
use crate::types::{Machine, MachineIndex, MachineState};

/// Errors that can occur while locating, reading or parsing the index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The index file does not exist.
    ///
    /// Usually means Vagrant is not installed or no machine was ever created.
    #[error(
        "Vagrant machine index not found at {}. Is Vagrant installed and at least one VM created?",
        .0.display()
    )]
    NotFound(PathBuf),

    /// The index is not valid JSON or lacks a required field.
    #[error("malformed machine index: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The index declares a format version this crate cannot parse.
    #[error("unsupported machine index version: {0}")]
    UnsupportedVersion(u64),

    /// Reading the index failed for a reason other than absence.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IndexError {
    /// Returns `true` if the index file is missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Index file format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVersion {
    V1,
}

impl TryFrom<u64> for IndexVersion {
    type Error = IndexError;

    fn try_from(version: u64) -> Result<Self, Self::Error> {
        match version {
            1 => Ok(Self::V1),
            other => Err(IndexError::UnsupportedVersion(other)),
        }
    }
}

/// Fields shared by every index version.
#[derive(Debug, Deserialize)]
struct IndexHeader {
    version: u64,
}

#[derive(Debug, Deserialize)]
struct IndexFileV1 {
    machines: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct MachineEntryV1 {
    state: MachineState,
    vagrantfile_path: PathBuf,
    name: String,
}

/// Reads machine index snapshots from a fixed path.
#[derive(Debug, Clone)]
pub struct MachineIndexReader {
    path: PathBuf,
}

impl MachineIndexReader {
    /// Creates a reader for the index file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a reader for the index under the configured Vagrant home.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.index_path())
    }

    /// Returns the path this reader reads from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the index.
    ///
    /// # Errors
    ///
    /// - [`IndexError::NotFound`] if the path is not a regular file; nothing is
    ///   read in that case
    /// - [`IndexError::Malformed`] or [`IndexError::UnsupportedVersion`] if the
    ///   contents cannot be parsed
    /// - [`IndexError::Io`] for any other read failure
    pub fn read(&self) -> Result<MachineIndex, IndexError> {
        ensure_index_file(&self.path)?;

        // The file can disappear between the check and the read.
        let bytes = fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => IndexError::NotFound(self.path.clone()),
            _ => IndexError::Io(e),
        })?;

        let index = parse_index(&bytes)?;

        debug!(
            path = %self.path.display(),
            machine_count = index.len(),
            "Read machine index"
        );

        Ok(index)
    }
}

/// Resolves the index path under `vagrant_home` and checks that it exists.
///
/// # Errors
///
/// Returns [`IndexError::NotFound`] if the resolved path is not a regular file.
pub fn resolve_index_path(vagrant_home: &Path) -> Result<PathBuf, IndexError> {
    let path = vagrant_home.join(MACHINE_INDEX_PATH);
    ensure_index_file(&path)?;
    Ok(path)
}

/// Reads the machine index at the configured location.
///
/// # Errors
///
/// See [`MachineIndexReader::read`].
pub fn get_index(config: &Config) -> Result<MachineIndex, IndexError> {
    MachineIndexReader::from_config(config).read()
}

/// Parses the raw contents of an index file.
///
/// # Errors
///
/// Returns [`IndexError::Malformed`] if the document is not a JSON object with
/// a numeric `version`, or if the version-specific layout is violated, and
/// [`IndexError::UnsupportedVersion`] for versions other than 1.
pub fn parse_index(bytes: &[u8]) -> Result<MachineIndex, IndexError> {
    let document: Value = serde_json::from_slice(bytes)?;
    if !document.is_object() {
        return Err(serde_json::Error::custom("machine index root must be a JSON object").into());
    }

    let header = IndexHeader::deserialize(&document)?;

    match IndexVersion::try_from(header.version)? {
        IndexVersion::V1 => parse_v1(document),
    }
}

fn parse_v1(document: Value) -> Result<MachineIndex, IndexError> {
    let file = IndexFileV1::deserialize(document)?;

    file.machines
        .into_iter()
        .map(|(id, entry)| -> Result<Machine, IndexError> {
            let entry = MachineEntryV1::deserialize(entry)
                .map_err(|e| serde_json::Error::custom(format!("machine {id}: {e}")))?;
            Ok(Machine {
                id,
                state: entry.state,
                directory: entry.vagrantfile_path,
                name: entry.name,
            })
        })
        .collect()
}

fn ensure_index_file(path: &Path) -> Result<(), IndexError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IndexError::NotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TWO_MACHINES: &str = r#"{
        "version": 1,
        "machines": {
            "f1e2d3": {
                "local_data_path": "/home/dev/web/.vagrant",
                "name": "default",
                "provider": "virtualbox",
                "state": "running",
                "vagrantfile_name": null,
                "vagrantfile_path": "/home/dev/web",
                "updated_at": null,
                "extra_data": {}
            },
            "a9b8c7": {
                "name": "db",
                "state": "poweroff",
                "vagrantfile_path": "/home/dev/db"
            }
        }
    }"#;

    /// Writes `contents` as the machine index under a fresh Vagrant home.
    fn write_index(contents: &str) -> (TempDir, PathBuf) {
        let home = tempfile::tempdir().expect("Failed to create temp dir");
        let path = home.path().join(MACHINE_INDEX_PATH);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create index dir");
        fs::write(&path, contents).expect("Failed to write index");
        (home, path)
    }

    #[test]
    fn parses_two_machines_preserving_fields() {
        let index = parse_index(TWO_MACHINES.as_bytes()).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(
            index.as_slice(),
            &[
                Machine::new("f1e2d3", "running", "/home/dev/web", "default"),
                Machine::new("a9b8c7", "poweroff", "/home/dev/db", "db"),
            ]
        );
    }

    #[test]
    fn preserves_document_order() {
        let json = r#"{"version":1,"machines":{
            "zzz":{"state":"running","vagrantfile_path":"/z","name":"z"},
            "aaa":{"state":"running","vagrantfile_path":"/a","name":"a"},
            "mmm":{"state":"running","vagrantfile_path":"/m","name":"m"}
        }}"#;

        let index = parse_index(json.as_bytes()).unwrap();
        let ids: Vec<_> = index.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["zzz", "aaa", "mmm"]);
    }

    #[test]
    fn unknown_state_is_kept() {
        let json = r#"{"version":1,"machines":{
            "m1":{"state":"saved","vagrantfile_path":"/p","name":"default"}
        }}"#;

        let index = parse_index(json.as_bytes()).unwrap();
        assert_eq!(
            index.get("m1").unwrap().state,
            MachineState::Other("saved".to_string())
        );
    }

    #[test]
    fn empty_machines_object() {
        let index = parse_index(br#"{"version":1,"machines":{}}"#).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn missing_machine_field_is_malformed() {
        let json = r#"{"version":1,"machines":{
            "m1":{"state":"running","name":"default"}
        }}"#;

        let err = parse_index(json.as_bytes()).unwrap_err();
        assert!(matches!(err, IndexError::Malformed(_)));
        let message = err.to_string();
        assert!(message.contains("m1"), "message should name the machine: {message}");
        assert!(message.contains("vagrantfile_path"));
    }

    #[test]
    fn missing_machines_is_malformed() {
        let err = parse_index(br#"{"version":1}"#).unwrap_err();
        assert!(matches!(err, IndexError::Malformed(_)));
    }

    #[test]
    fn missing_version_is_malformed() {
        let err = parse_index(br#"{"machines":{}}"#).unwrap_err();
        assert!(matches!(err, IndexError::Malformed(_)));
    }

    #[test]
    fn non_object_root_is_malformed() {
        let err = parse_index(br#"[1, {}]"#).unwrap_err();
        assert!(matches!(err, IndexError::Malformed(_)));
    }

    #[test]
    fn truncated_json_is_malformed() {
        let truncated = &TWO_MACHINES.as_bytes()[..TWO_MACHINES.len() / 2];
        let err = parse_index(truncated).unwrap_err();
        assert!(matches!(err, IndexError::Malformed(_)));
    }

    #[test]
    fn unsupported_version_fails_loudly() {
        let err = parse_index(br#"{"version":2,"machines":{}}"#).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedVersion(2)));
        assert_eq!(err.to_string(), "unsupported machine index version: 2");
    }

    #[test]
    fn version_dispatch() {
        assert_eq!(IndexVersion::try_from(1).unwrap(), IndexVersion::V1);
        assert!(matches!(
            IndexVersion::try_from(0),
            Err(IndexError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn reader_reads_file() {
        let (_home, path) = write_index(TWO_MACHINES);

        let index = MachineIndexReader::new(&path).read().unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn get_index_uses_configured_home() {
        let (home, _path) = write_index(TWO_MACHINES);
        let config = Config::with_vagrant_home(home.path());

        let index = get_index(&config).unwrap();
        assert!(index.contains("f1e2d3"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let home = tempfile::tempdir().unwrap();
        let config = Config::with_vagrant_home(home.path());

        let err = get_index(&config).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, IndexError::NotFound(ref p) if *p == config.index_path()));
        assert!(err.to_string().contains("Is Vagrant installed"));
    }

    #[test]
    fn directory_in_place_of_index_is_not_found() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(MACHINE_INDEX_PATH)).unwrap();

        let err = MachineIndexReader::new(home.path().join(MACHINE_INDEX_PATH))
            .read()
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn resolve_index_path_checks_existence() {
        let (home, path) = write_index(TWO_MACHINES);
        assert_eq!(resolve_index_path(home.path()).unwrap(), path);

        let empty = tempfile::tempdir().unwrap();
        assert!(resolve_index_path(empty.path()).unwrap_err().is_not_found());
    }
}
