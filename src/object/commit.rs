use tracing::debug;

use crate::error::{Error, Result};
use crate::object::{object_exists, read_object_of_kind, write_object};
use crate::oid::Oid;
use crate::repo::Repo;
use crate::types::{Commit, ObjectKind};

/// write a commit to the object store
///
/// the root tree and every parent must already be stored, so a ref moved
/// to the returned id never points at a dangling commit.
pub fn write_commit(repo: &Repo, commit: &Commit) -> Result<Oid> {
    if !object_exists(repo, &commit.tree) {
        return Err(Error::ObjectNotFound(commit.tree));
    }
    for parent in &commit.parents {
        if !object_exists(repo, parent) {
            return Err(Error::ObjectNotFound(*parent));
        }
    }

    let oid = write_object(repo, ObjectKind::Commit, &commit.encode())?;
    debug!(%oid, tree = %commit.tree, parents = commit.parents.len(), "wrote commit");
    Ok(oid)
}

/// read and decode a commit
pub fn read_commit(repo: &Repo, oid: &Oid) -> Result<Commit> {
    let body = read_object_of_kind(repo, oid, ObjectKind::Commit)?;
    Commit::decode(&body)
}
