use crate::error::Result;
use crate::object::read_blob;
use crate::ops::path::{find_blob, root_tree};
use crate::oid::Oid;
use crate::repo::Repo;

/// contents of the file at `path` below the tree `root`
pub fn read_file(repo: &Repo, root: &Oid, path: &str) -> Result<Vec<u8>> {
    let entry = find_blob(repo, root, path)?;
    read_blob(repo, &entry.oid)
}

/// contents of the file at `path` in the commit named by `ref_name`
pub fn cat(repo: &Repo, ref_name: &str, path: &str) -> Result<Vec<u8>> {
    let root = root_tree(repo, ref_name)?;
    read_file(repo, &root, path)
}
