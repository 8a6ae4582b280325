use crate::error::{Error, Result};
use crate::object::{peel_to_commit, read_commit, read_tree};
use crate::oid::Oid;
use crate::refs::resolve_ref;
use crate::repo::Repo;
use crate::types::{validate_entry_name, ObjectKind, Tree, TreeEntry};

/// split a slash-separated path into segments
///
/// leading, trailing and doubled slashes produce no segments, so `""`,
/// `"/"` and `"//"` all name the root.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// segments of a path a commit may write to
///
/// the path must name at least one segment and every segment must be a
/// valid tree entry name.
pub fn split_commit_path(path: &str) -> Result<Vec<&str>> {
    let segments = split_path(path);
    if segments.is_empty() {
        return Err(Error::InvalidPath(path.to_string()));
    }
    for segment in &segments {
        validate_entry_name(segment.as_bytes())
            .map_err(|_| Error::InvalidPath(format!("{}: bad segment {:?}", path, segment)))?;
    }
    Ok(segments)
}

/// root tree of the commit a ref or id names
pub fn root_tree(repo: &Repo, ref_name: &str) -> Result<Oid> {
    let commit = peel_to_commit(repo, &resolve_ref(repo, ref_name)?)?;
    Ok(read_commit(repo, &commit)?.tree)
}

/// descend from `root` to the directory named by `path`
pub fn find_tree(repo: &Repo, root: &Oid, path: &str) -> Result<Tree> {
    let mut tree = read_tree(repo, root)?;
    for segment in split_path(path) {
        let oid = match tree.get(segment) {
            Some(entry) if entry.is_tree() => entry.oid,
            _ => return Err(Error::PathNotFound(path.to_string())),
        };
        tree = read_tree(repo, &oid)?;
    }
    Ok(tree)
}

/// the blob entry at `path` below `root`
///
/// an empty path is invalid; a missing segment, a directory in the last
/// position or a non-directory along the way is `PathNotFound`.
pub fn find_blob(repo: &Repo, root: &Oid, path: &str) -> Result<TreeEntry> {
    let segments = split_path(path);
    let Some((name, parents)) = segments.split_last() else {
        return Err(Error::InvalidPath(path.to_string()));
    };

    let mut tree = read_tree(repo, root)?;
    for segment in parents {
        let oid = match tree.get(segment) {
            Some(entry) if entry.is_tree() => entry.oid,
            _ => return Err(Error::PathNotFound(path.to_string())),
        };
        tree = read_tree(repo, &oid)?;
    }

    match tree.get(name) {
        Some(entry) if entry.kind() == ObjectKind::Blob => Ok(entry.clone()),
        _ => Err(Error::PathNotFound(path.to_string())),
    }
}
