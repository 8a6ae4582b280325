use std::fmt;

use crate::error::Result;
use crate::ops::path::{find_tree, root_tree, split_path};
use crate::oid::Oid;
use crate::repo::Repo;
use crate::types::TreeEntry;

/// list tree entry with full path
#[derive(Debug, Clone)]
pub struct LsTreeEntry {
    pub path: String,
    pub entry: TreeEntry,
}

/// entries of the directory at `path` below the tree `root`, not recursive
pub fn list_tree(repo: &Repo, root: &Oid, path: &str) -> Result<Vec<TreeEntry>> {
    Ok(find_tree(repo, root, path)?.into_entries())
}

/// list the directory at `path` in the commit named by `ref_name`
pub fn ls_tree(repo: &Repo, ref_name: &str, path: &str) -> Result<Vec<LsTreeEntry>> {
    let root = root_tree(repo, ref_name)?;
    let prefix = split_path(path).join("/");

    let entries = list_tree(repo, &root, path)?
        .into_iter()
        .map(|entry| LsTreeEntry {
            path: if prefix.is_empty() {
                entry.name_lossy().into_owned()
            } else {
                format!("{}/{}", prefix, entry.name_lossy())
            },
            entry,
        })
        .collect();
    Ok(entries)
}

/// `git ls-tree` layout: `<mode> <kind> <oid>\t<path>`
impl fmt::Display for LsTreeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0>6} {} {}\t{}",
            self.entry.mode.as_octal(),
            self.entry.kind(),
            self.entry.oid,
            self.path
        )
    }
}
