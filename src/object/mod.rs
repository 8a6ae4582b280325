pub mod blob;
pub mod commit;
pub(crate) mod delta;
pub mod loose;
pub mod pack;
pub mod tree;

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::oid::{compute_object_hash, Oid};
use crate::repo::Repo;
use crate::types::ObjectKind;

pub use blob::{read_blob, write_blob};
pub use commit::{read_commit, write_commit};
pub use tree::{read_tree, write_tree};

/// annotated tags nested deeper than this are treated as corrupt
const MAX_PEEL_DEPTH: usize = 16;

/// REF_DELTA bases resolved outside their own pack, per read
const MAX_EXTERNAL_BASES: usize = 64;

/// read an object from loose storage or any pack, verifying its hash
///
/// a miss rescans the pack directory once, so objects moved into a new
/// pack by a concurrent repack are still found.
pub fn read_object(repo: &Repo, oid: &Oid) -> Result<(ObjectKind, Vec<u8>)> {
    read_bounded(repo, oid, MAX_EXTERNAL_BASES)
}

fn read_bounded(repo: &Repo, oid: &Oid, budget: usize) -> Result<(ObjectKind, Vec<u8>)> {
    let found = match read_unverified(repo, oid, budget)? {
        Some(found) => found,
        None => {
            if !repo.reload_packs()? {
                return Err(Error::ObjectNotFound(*oid));
            }
            read_unverified(repo, oid, budget)?.ok_or(Error::ObjectNotFound(*oid))?
        }
    };

    let (kind, body) = found;
    if compute_object_hash(kind, &body) != *oid {
        return Err(Error::CorruptObject(*oid));
    }
    Ok((kind, body))
}

fn read_unverified(
    repo: &Repo,
    oid: &Oid,
    budget: usize,
) -> Result<Option<(ObjectKind, Vec<u8>)>> {
    if let Some(found) = loose::read_loose(repo, oid)? {
        return Ok(Some(found));
    }

    // bases in other packs may point back here, so each hop spends budget
    let external = |base: &Oid| match budget.checked_sub(1) {
        Some(left) => read_bounded(repo, base, left),
        None => Err(Error::CorruptObjectMessage(format!(
            "delta base {} of {} is nested across too many packs",
            base, oid
        ))),
    };
    for pack in repo.packs() {
        if let Some(found) = pack.read(oid, &external)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// read an object that must be of the given kind
pub fn read_object_of_kind(repo: &Repo, oid: &Oid, expected: ObjectKind) -> Result<Vec<u8>> {
    let (actual, body) = read_object(repo, oid)?;
    if actual != expected {
        return Err(Error::UnexpectedKind {
            oid: *oid,
            expected,
            actual,
        });
    }
    Ok(body)
}

/// store an object unless it already exists, returning its id
pub fn write_object(repo: &Repo, kind: ObjectKind, body: &[u8]) -> Result<Oid> {
    let oid = compute_object_hash(kind, body);
    if repo.packs().iter().any(|pack| pack.contains(&oid)) {
        return Ok(oid);
    }
    loose::write_loose(repo, kind, body)
}

/// check whether an object is stored, loose or packed
pub fn object_exists(repo: &Repo, oid: &Oid) -> bool {
    loose::loose_exists(repo, oid) || repo.packs().iter().any(|pack| pack.contains(oid))
}

/// number of distinct objects in the store
pub fn count_objects(repo: &Repo) -> Result<usize> {
    let mut oids: BTreeSet<Oid> = loose::list_loose(repo)?.into_iter().collect();
    for pack in repo.packs() {
        oids.extend(pack.oids());
    }
    Ok(oids.len())
}

/// follow annotated tags until a commit is reached
pub fn peel_to_commit(repo: &Repo, oid: &Oid) -> Result<Oid> {
    let mut current = *oid;
    for _ in 0..MAX_PEEL_DEPTH {
        let (kind, body) = read_object(repo, &current)?;
        match kind {
            ObjectKind::Commit => return Ok(current),
            ObjectKind::Tag => current = tag_target(&current, &body)?,
            actual => {
                return Err(Error::UnexpectedKind {
                    oid: current,
                    expected: ObjectKind::Commit,
                    actual,
                })
            }
        }
    }
    Err(Error::CorruptObjectMessage(format!(
        "tag chain from {} too deep",
        oid
    )))
}

/// object named by the `object` header of a tag
fn tag_target(oid: &Oid, body: &[u8]) -> Result<Oid> {
    let text = String::from_utf8_lossy(body);
    let target = text
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix("object "))
        .ok_or_else(|| Error::CorruptObjectMessage(format!("tag {} has no object", oid)))?;
    Oid::from_hex(target.trim())
}

#[cfg(test)]
mod tests {
    use super::pack::testutil::PackBuilder;
    use super::*;
    use crate::types::{Commit, Signature, Tree, TreeEntry};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    fn sample_commit(repo: &Repo) -> Oid {
        let blob = write_blob(repo, b"content").unwrap();
        let tree = Tree::new(vec![TreeEntry::blob("file", blob)]).unwrap();
        let tree = write_tree(repo, &tree).unwrap();
        let sig = Signature::new("Tester", "t@example.com", 1700000000, 0);
        write_commit(repo, &Commit::new(tree, vec![], sig, "msg\n")).unwrap()
    }

    #[test]
    fn test_read_object_verifies_hash() {
        let (_dir, repo) = test_repo();
        let a = write_blob(&repo, b"aaaa").unwrap();
        let b = write_blob(&repo, b"bbbb").unwrap();

        // a valid object stored under the wrong name
        let a_path = loose::loose_path(&repo, &a);
        let b_path = loose::loose_path(&repo, &b);
        std::fs::copy(&b_path, &a_path).unwrap();

        assert!(matches!(
            read_object(&repo, &a),
            Err(Error::CorruptObject(oid)) if oid == a
        ));
        assert_eq!(read_object(&repo, &b).unwrap().1, b"bbbb");
    }

    #[test]
    fn test_read_missing_object() {
        let (_dir, repo) = test_repo();
        assert!(matches!(
            read_object(&repo, &Oid::ZERO),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_unexpected_kind() {
        let (_dir, repo) = test_repo();
        let blob = write_blob(&repo, b"not a tree").unwrap();

        assert!(matches!(
            read_object_of_kind(&repo, &blob, ObjectKind::Tree),
            Err(Error::UnexpectedKind {
                expected: ObjectKind::Tree,
                actual: ObjectKind::Blob,
                ..
            })
        ));
    }

    #[test]
    fn test_count_objects_dedups() {
        let (_dir, repo) = test_repo();
        assert_eq!(count_objects(&repo).unwrap(), 0);

        write_blob(&repo, b"one").unwrap();
        write_blob(&repo, b"one").unwrap();
        write_blob(&repo, b"two").unwrap();

        assert_eq!(count_objects(&repo).unwrap(), 2);
    }

    #[test]
    fn test_packed_objects_found_after_rescan() {
        let (_dir, repo) = test_repo();

        let mut builder = PackBuilder::new();
        let base = b"packed base\n".to_vec();
        let target = b"packed base\nwith a second line\n".to_vec();
        let (_, base_offset) = builder.add(ObjectKind::Blob, &base);
        let (delta_oid, _) = builder.add_ofs_delta(base_offset, &base, ObjectKind::Blob, &target);
        // the pack appears after the repository was opened
        builder.write(&repo.packs_path(), "late");

        assert!(!object_exists(&repo, &delta_oid));
        assert_eq!(read_blob(&repo, &delta_oid).unwrap(), target);
        assert!(object_exists(&repo, &delta_oid));
        assert_eq!(count_objects(&repo).unwrap(), 2);
    }

    #[test]
    fn test_write_skips_packed_objects() {
        let (_dir, repo) = test_repo();

        let mut builder = PackBuilder::new();
        let (oid, _) = builder.add(ObjectKind::Blob, b"already packed");
        builder.write(&repo.packs_path(), "p");
        repo.reload_packs().unwrap();

        assert_eq!(write_blob(&repo, b"already packed").unwrap(), oid);
        assert!(!loose::loose_exists(&repo, &oid));
    }

    #[test]
    fn test_ref_delta_against_loose_base() {
        let (_dir, repo) = test_repo();
        let base = b"loose base object".to_vec();
        let target = b"loose base object, patched".to_vec();
        let base_oid = write_blob(&repo, &base).unwrap();

        let mut builder = PackBuilder::new();
        let (oid, _) = builder.add_ref_delta(base_oid, &base, ObjectKind::Blob, &target);
        builder.write(&repo.packs_path(), "thin");

        assert_eq!(read_blob(&repo, &oid).unwrap(), target);
    }

    #[test]
    fn test_ref_delta_cycle_across_packs() {
        let (_dir, repo) = test_repo();
        let a = b"first object, deltified against the second".to_vec();
        let b = b"second object, deltified against the first".to_vec();
        let a_oid = compute_object_hash(ObjectKind::Blob, &a);
        let b_oid = compute_object_hash(ObjectKind::Blob, &b);

        let mut one = PackBuilder::new();
        one.add_ref_delta(b_oid, &b, ObjectKind::Blob, &a);
        one.write(&repo.packs_path(), "one");
        let mut two = PackBuilder::new();
        two.add_ref_delta(a_oid, &a, ObjectKind::Blob, &b);
        two.write(&repo.packs_path(), "two");

        assert!(matches!(
            read_blob(&repo, &a_oid),
            Err(Error::CorruptObjectMessage(_))
        ));
        assert!(object_exists(&repo, &b_oid));
    }

    #[test]
    fn test_peel_annotated_tag() {
        let (_dir, repo) = test_repo();
        let commit = sample_commit(&repo);

        let tag_body = format!(
            "object {}\ntype commit\ntag v1\ntagger Tester <t@example.com> 1700000000 +0000\n\nrelease\n",
            commit
        );
        let tag = write_object(&repo, ObjectKind::Tag, tag_body.as_bytes()).unwrap();

        assert_eq!(peel_to_commit(&repo, &tag).unwrap(), commit);
        assert_eq!(peel_to_commit(&repo, &commit).unwrap(), commit);
    }

    #[test]
    fn test_peel_rejects_blob() {
        let (_dir, repo) = test_repo();
        let blob = write_blob(&repo, b"plain").unwrap();

        assert!(matches!(
            peel_to_commit(&repo, &blob),
            Err(Error::UnexpectedKind {
                expected: ObjectKind::Commit,
                ..
            })
        ));
    }
}
