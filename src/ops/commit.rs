use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::object::{peel_to_commit, read_commit, read_tree, write_blob, write_commit, write_tree};
use crate::ops::path::split_commit_path;
use crate::oid::Oid;
use crate::refs::{canonical_name, read_ref, update_ref};
use crate::repo::Repo;
use crate::types::{Commit, Signature, Tree, TreeEntry};

/// commit `contents` at `path` on top of `ref_name`
///
/// every other path keeps its current content: only the trees along
/// `path` are rewritten, all other entries are reused as they are. the
/// ref is advanced with a compare-and-swap; if another writer moved it
/// first, the change is rebuilt on the new tip, up to
/// `max_commit_attempts` times before giving up with `Conflict`.
pub fn commit_file(
    repo: &Repo,
    ref_name: &str,
    message: &str,
    path: &str,
    contents: &[u8],
) -> Result<Oid> {
    let refname = canonical_name(repo, ref_name)?;
    let segments = split_commit_path(path)?;
    let blob = write_blob(repo, contents)?;

    let max_attempts = repo.config().max_commit_attempts.max(1);
    for attempt in 1..=max_attempts {
        let tip = match read_ref(repo, &refname) {
            Ok(oid) => Some(oid),
            Err(Error::RefNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let parent = tip.map(|oid| peel_to_commit(repo, &oid)).transpose()?;

        let root = match &parent {
            Some(parent) => read_tree(repo, &read_commit(repo, parent)?.tree)?,
            None => Tree::empty(),
        };
        let new_root = upsert(repo, &root, &segments, blob, path)?;
        let tree = write_tree(repo, &new_root)?;

        let author = &repo.config().author;
        let signature = Signature::now(author.name.clone(), author.email.clone());
        let commit = Commit::new(tree, parent.into_iter().collect(), signature, message);
        let oid = write_commit(repo, &commit)?;

        match update_ref(repo, &refname, tip.as_ref(), &oid) {
            Ok(()) => {
                info!(refname = %refname, %oid, path, attempt, "committed");
                return Ok(oid);
            }
            Err(e) if e.is_ref_race() => {
                warn!(refname = %refname, attempt, error = %e, "ref moved during commit");
                if let Some(delay) = backoff(attempt, max_attempts) {
                    thread::sleep(delay);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::Conflict {
        refname,
        attempts: max_attempts,
    })
}

/// pause before retrying `attempt`, none once attempts are used up
fn backoff(attempt: u32, max_attempts: u32) -> Option<Duration> {
    (attempt < max_attempts).then_some(Duration::from_millis(attempt as u64))
}

/// `tree` with the blob placed at `segments`, rebuilding the trees on the way
fn upsert(repo: &Repo, tree: &Tree, segments: &[&str], blob: Oid, path: &str) -> Result<Tree> {
    let Some((name, rest)) = segments.split_first() else {
        return Err(Error::InvalidPath(path.to_string()));
    };

    if rest.is_empty() {
        return tree.with_entry(TreeEntry::blob(*name, blob));
    }

    let child = match tree.get(name) {
        Some(entry) if entry.is_tree() => read_tree(repo, &entry.oid)?,
        Some(_) => {
            return Err(Error::InvalidPath(format!(
                "{}: {} is not a directory",
                path, name
            )))
        }
        None => Tree::empty(),
    };

    let child = upsert(repo, &child, rest, blob, path)?;
    let child_oid = write_tree(repo, &child)?;
    debug!(name = *name, oid = %child_oid, "rebuilt tree");
    tree.with_entry(TreeEntry::tree(*name, child_oid))
}
