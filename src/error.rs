use std::path::PathBuf;

use crate::types::ObjectKind;
use crate::Oid;

/// error type for libellus operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found at {0}")]
    NoRepo(PathBuf),

    #[error("repository already exists at {0}")]
    RepoExists(PathBuf),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    #[error("ref {0} changed since it was read")]
    StaleRef(String),

    #[error("path not found in tree: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("object not found: {0}")]
    ObjectNotFound(Oid),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(Oid),

    #[error("corrupt object: {0}")]
    CorruptObjectMessage(String),

    #[error("object {oid} is a {actual}, expected a {expected}")]
    UnexpectedKind {
        oid: Oid,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("lock contention on {0}")]
    LockContention(PathBuf),

    #[error("commit to {refname} abandoned after {attempts} conflicting attempts")]
    Conflict { refname: String, attempts: u32 },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),
}

impl Error {
    /// missing ref, path, or object
    ///
    /// the facade turns these into an empty result instead of an error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RefNotFound(_) | Error::PathNotFound(_) | Error::ObjectNotFound(_)
        )
    }

    /// errors a commit can recover from by rebuilding against the new tip
    pub(crate) fn is_ref_race(&self) -> bool {
        matches!(self, Error::StaleRef(_) | Error::LockContention(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
