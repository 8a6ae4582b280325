use crate::error::Result;
use crate::object::{read_object_of_kind, write_object};
use crate::oid::Oid;
use crate::repo::Repo;
use crate::types::ObjectKind;

/// write a blob to the object store
///
/// returns the blob id; storing the same bytes twice is a no-op.
pub fn write_blob(repo: &Repo, content: &[u8]) -> Result<Oid> {
    write_object(repo, ObjectKind::Blob, content)
}

/// read blob content
pub fn read_blob(repo: &Repo, oid: &Oid) -> Result<Vec<u8>> {
    read_object_of_kind(repo, oid, ObjectKind::Blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::object::{count_objects, object_exists};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_write_and_read_blob() {
        let (_dir, repo) = test_repo();

        let content = b"hello world";
        let oid = write_blob(&repo, content).unwrap();

        assert!(object_exists(&repo, &oid));
        assert_eq!(read_blob(&repo, &oid).unwrap(), content);
    }

    #[test]
    fn test_empty_blob() {
        let (_dir, repo) = test_repo();

        let oid = write_blob(&repo, b"").unwrap();
        assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert!(read_blob(&repo, &oid).unwrap().is_empty());
    }

    #[test]
    fn test_blob_deduplication() {
        let (_dir, repo) = test_repo();

        let h1 = write_blob(&repo, b"same content").unwrap();
        let h2 = write_blob(&repo, b"same content").unwrap();

        assert_eq!(h1, h2);
        assert_eq!(count_objects(&repo).unwrap(), 1);
    }

    #[test]
    fn test_binary_blob() {
        let (_dir, repo) = test_repo();

        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let oid = write_blob(&repo, &content).unwrap();

        assert_eq!(read_blob(&repo, &oid).unwrap(), content);
    }

    #[test]
    fn test_read_nonexistent_blob() {
        let (_dir, repo) = test_repo();

        let fake = Oid::from_hex("1111111111111111111111111111111111111111").unwrap();
        assert!(matches!(
            read_blob(&repo, &fake),
            Err(Error::ObjectNotFound(_))
        ));
    }
}
