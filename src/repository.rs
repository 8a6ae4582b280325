use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::object::{count_objects, peel_to_commit, read_commit};
use crate::ops::{self, split_path, LogEntry};
use crate::oid::Oid;
use crate::refs::{canonical_name, read_ref};
use crate::repo::Repo;
use crate::types::{ObjectKind, TreeEntry};

/// directory entry as seen through the facade
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct File {
    pub name: String,
    /// true for regular files, executables and symlinks
    pub is_blob: bool,
    pub oid: Oid,
}

impl From<TreeEntry> for File {
    fn from(entry: TreeEntry) -> Self {
        Self {
            is_blob: entry.kind() == ObjectKind::Blob,
            name: String::from_utf8(entry.name)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
            oid: entry.oid,
        }
    }
}

/// path-addressed view of one branch of a git repository
///
/// reads and commits always go through the ref fixed at construction.
/// missing refs, paths and objects come back as `None` from `list` and
/// `read`; everything else is an error.
pub struct Repository {
    repo: Repo,
    refname: String,
}

impl Repository {
    /// open the repository at `path` on its configured ref
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repo::open(path)?;
        let refname = repo.config().refname.clone();
        Self::from_repo(repo, &refname)
    }

    /// open the repository at `path` on the given ref
    pub fn open_ref(path: &Path, refname: &str) -> Result<Self> {
        Self::from_repo(Repo::open(path)?, refname)
    }

    /// open the repository at `path` with explicit settings
    pub fn with_config(path: &Path, config: Config) -> Result<Self> {
        let refname = config.refname.clone();
        Self::from_repo(Repo::open_with_config(path, config)?, &refname)
    }

    fn from_repo(repo: Repo, refname: &str) -> Result<Self> {
        let refname = canonical_name(&repo, refname)?;
        // an unborn ref is fine; one that exists must lead to a commit
        match read_ref(&repo, &refname) {
            Ok(oid) => {
                peel_to_commit(&repo, &oid)?;
            }
            Err(Error::RefNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(Self { repo, refname })
    }

    /// full name of the ref this view follows
    pub fn refname(&self) -> &str {
        &self.refname
    }

    /// underlying git directory handle
    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    /// commit the ref points at, or None while it is unborn
    pub fn head(&self) -> Result<Option<Oid>> {
        match read_ref(&self.repo, &self.refname) {
            Ok(oid) => peel_to_commit(&self.repo, &oid).map(Some),
            Err(Error::RefNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn root_tree(&self) -> Result<Option<Oid>> {
        match self.head()? {
            Some(commit) => Ok(Some(read_commit(&self.repo, &commit)?.tree)),
            None => Ok(None),
        }
    }

    /// entries of the directory at `path`, not recursive
    ///
    /// `""` and `"/"` list the root. an unborn ref has an empty root.
    pub fn list(&self, path: &str) -> Result<Option<Vec<File>>> {
        let Some(root) = self.root_tree()? else {
            return Ok(split_path(path).is_empty().then(Vec::new));
        };

        let entries = found(ops::list_tree(&self.repo, &root, path))?;
        Ok(entries.map(|entries| entries.into_iter().map(File::from).collect()))
    }

    /// contents of the file at `path`
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        if split_path(path).is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let Some(root) = self.root_tree()? else {
            return Ok(None);
        };

        found(ops::read_file(&self.repo, &root, path))
    }

    /// record `contents` at `path` as a new commit on the ref
    pub fn commit(&self, message: &str, path: &str, contents: &[u8]) -> Result<Oid> {
        ops::commit_file(&self.repo, &self.refname, message, path, contents)
    }

    /// first-parent history, newest first
    pub fn log(&self, max_count: Option<usize>) -> Result<Vec<LogEntry>> {
        match ops::log(&self.repo, &self.refname, max_count) {
            Err(Error::RefNotFound(_)) => Ok(Vec::new()),
            result => result,
        }
    }

    /// number of distinct objects in the store
    pub fn count_objects(&self) -> Result<usize> {
        count_objects(&self.repo)
    }
}

fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
