use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::types::ObjectKind;

/// a directory tree - collection of entries in git's canonical order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// create a new tree, validating and sorting entries
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            validate_entry_name(&entry.name)?;
            // "a" as a file and "a" as a tree sort apart, so adjacency is not enough
            if !seen.insert(entry.name.as_slice()) {
                return Err(Error::DuplicateEntryName(entry.name_lossy().into_owned()));
            }
        }

        entries.sort_by(TreeEntry::canonical_cmp);

        Ok(Self { entries })
    }

    /// create an empty tree
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// get entries slice
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// consume and return entries
    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// look up entry by name
    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&TreeEntry> {
        self.position(name.as_ref()).map(|i| &self.entries[i])
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is tree empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// return a copy of this tree with `entry` added, replacing any entry of
    /// the same name whatever its mode
    pub fn with_entry(&self, entry: TreeEntry) -> Result<Tree> {
        validate_entry_name(&entry.name)?;

        let mut entries = self.entries.clone();
        if let Some(i) = self.position(&entry.name) {
            entries.remove(i);
        }

        let at = entries
            .binary_search_by(|e| e.canonical_cmp(&entry))
            .unwrap_or_else(|pos| pos);
        entries.insert(at, entry);

        Ok(Tree { entries })
    }

    /// canonical body bytes: `<octal mode> <name>\0<20-byte id>` per entry
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 40);
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    /// parse tree body bytes
    ///
    /// entries are taken in stored order; the store is trusted to hold
    /// canonical trees since their ids depend on it. names are kept as raw
    /// bytes, they need not be utf-8.
    pub fn decode(data: &[u8]) -> Result<Tree> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            let space = data[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| malformed("missing space after mode"))?;
            let mode_bytes = &data[pos..pos + space];
            let mode = FileMode::from_octal(mode_bytes).ok_or_else(|| {
                malformed(&format!(
                    "invalid mode {}",
                    String::from_utf8_lossy(mode_bytes)
                ))
            })?;
            pos += space + 1;

            let nul = data[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| malformed("missing NUL after name"))?;
            let name = data[pos..pos + nul].to_vec();
            pos += nul + 1;

            if pos + Oid::LEN > data.len() {
                return Err(malformed("truncated entry id"));
            }
            let oid = Oid::from_slice(&data[pos..pos + Oid::LEN])?;
            pos += Oid::LEN;

            entries.push(TreeEntry { name, mode, oid });
        }

        Ok(Tree { entries })
    }

    fn position(&self, name: &[u8]) -> Option<usize> {
        // the sort key depends on the entry mode, so try both shapes
        [false, true].into_iter().find_map(|is_tree| {
            self.entries
                .binary_search_by(|e| {
                    git_tree_name_cmp(&e.name, e.is_tree(), name, is_tree)
                })
                .ok()
        })
    }
}

fn malformed(message: &str) -> Error {
    Error::CorruptObjectMessage(format!("malformed tree: {}", message))
}

/// validate an entry name
pub(crate) fn validate_entry_name(name: &[u8]) -> Result<()> {
    let shown = || String::from_utf8_lossy(name);
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains(&b'/') {
        return Err(Error::InvalidEntryName(format!(
            "name contains '/': {}",
            shown()
        )));
    }
    if name.contains(&0) {
        return Err(Error::InvalidEntryName(format!(
            "name contains null byte: {}",
            shown()
        )));
    }
    if name == b"." || name == b".." || name.eq_ignore_ascii_case(b".git") {
        return Err(Error::InvalidEntryName(format!("reserved name: {}", shown())));
    }
    Ok(())
}

/// compare entry names the way git orders trees
///
/// names compare bytewise; when one is a prefix of the other the next byte
/// is taken as `/` for trees and NUL for everything else, so `a.txt` sorts
/// before the directory `a` but after the file `a`.
pub fn git_tree_name_cmp(a: &[u8], a_is_tree: bool, b: &[u8], b_is_tree: bool) -> Ordering {
    let common = a.len().min(b.len());
    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => {}
        ord => return ord,
    }

    let next = |name: &[u8], is_tree: bool| {
        name.get(common)
            .copied()
            .unwrap_or(if is_tree { b'/' } else { 0 })
    };
    next(a, a_is_tree).cmp(&next(b, b_is_tree))
}

/// a single entry in a tree
///
/// the name is the raw byte string stored in the tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: Vec<u8>,
    pub mode: FileMode,
    pub oid: Oid,
}

impl TreeEntry {
    pub fn new(name: impl Into<Vec<u8>>, mode: FileMode, oid: Oid) -> Self {
        Self {
            name: name.into(),
            mode,
            oid,
        }
    }

    /// create a regular file entry
    pub fn blob(name: impl Into<Vec<u8>>, oid: Oid) -> Self {
        Self::new(name, FileMode::Blob, oid)
    }

    /// create a subdirectory entry
    pub fn tree(name: impl Into<Vec<u8>>, oid: Oid) -> Self {
        Self::new(name, FileMode::Tree, oid)
    }

    /// name as text, invalid utf-8 replaced with U+FFFD
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// is this a subdirectory
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// kind of the object this entry points at
    pub fn kind(&self) -> ObjectKind {
        self.mode.object_kind()
    }

    fn canonical_cmp(&self, other: &TreeEntry) -> Ordering {
        git_tree_name_cmp(&self.name, self.is_tree(), &other.name, other.is_tree())
    }
}

/// file mode of a tree entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// subdirectory (40000)
    Tree,
    /// regular file (100644)
    Blob,
    /// executable file (100755)
    Executable,
    /// symbolic link, target stored as blob content (120000)
    Symlink,
    /// submodule commit (160000)
    Gitlink,
}

impl FileMode {
    /// parse the octal mode written in tree objects
    ///
    /// non-canonical regular file modes (e.g. 100664 from old git versions)
    /// collapse to `Blob` or `Executable` on the owner execute bit.
    pub fn from_octal(bytes: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(bytes).ok()?;
        let mode = u32::from_str_radix(s, 8).ok()?;
        match mode & 0o170000 {
            0o040000 => Some(FileMode::Tree),
            0o100000 if mode & 0o100 != 0 => Some(FileMode::Executable),
            0o100000 => Some(FileMode::Blob),
            0o120000 => Some(FileMode::Symlink),
            0o160000 => Some(FileMode::Gitlink),
            _ => None,
        }
    }

    /// octal mode as written in tree objects
    pub const fn as_octal(&self) -> &'static str {
        match self {
            FileMode::Tree => "40000",
            FileMode::Blob => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Gitlink => "160000",
        }
    }

    /// is this a subdirectory
    pub fn is_tree(&self) -> bool {
        matches!(self, FileMode::Tree)
    }

    /// kind of object an entry with this mode points at
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            FileMode::Tree => ObjectKind::Tree,
            FileMode::Gitlink => ObjectKind::Commit,
            FileMode::Blob | FileMode::Executable | FileMode::Symlink => ObjectKind::Blob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::compute_object_hash;

    fn oid(n: u8) -> Oid {
        Oid::from_bytes([n; 20])
    }

    #[test]
    fn test_tree_empty() {
        let t = Tree::empty();
        assert!(t.is_empty());
        assert_eq!(t.len(), 0);
        assert!(t.encode().is_empty());
    }

    #[test]
    fn test_tree_sorting() {
        let entries = vec![
            TreeEntry::blob("zebra", oid(1)),
            TreeEntry::tree("src", oid(2)),
            TreeEntry::blob("README", oid(3)),
        ];
        let tree = Tree::new(entries).unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name_lossy()).collect();
        assert_eq!(names, vec!["README", "src", "zebra"]);
    }

    #[test]
    fn test_tree_git_ordering_for_directories() {
        let entries = vec![
            TreeEntry::tree("a", oid(1)),
            TreeEntry::blob("a.txt", oid(2)),
            TreeEntry::blob("a-b", oid(3)),
        ];
        let tree = Tree::new(entries).unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name_lossy()).collect();
        // '-' (0x2d) < '.' (0x2e) < '/' (0x2f)
        assert_eq!(names, vec!["a-b", "a.txt", "a"]);
    }

    #[test]
    fn test_name_cmp_terminators() {
        assert_eq!(git_tree_name_cmp(b"a", false, b"a.txt", false), Ordering::Less);
        assert_eq!(git_tree_name_cmp(b"a", true, b"a.txt", false), Ordering::Greater);
        assert_eq!(git_tree_name_cmp(b"same", false, b"same", false), Ordering::Equal);
        assert_ne!(git_tree_name_cmp(b"same", true, b"same", false), Ordering::Equal);
    }

    #[test]
    fn test_tree_get() {
        let entries = vec![
            TreeEntry::blob("alpha", oid(1)),
            TreeEntry::tree("a", oid(2)),
            TreeEntry::blob("a.txt", oid(3)),
        ];
        let tree = Tree::new(entries).unwrap();

        assert_eq!(tree.get("alpha").unwrap().oid, oid(1));
        assert!(tree.get("a").unwrap().is_tree());
        assert_eq!(tree.get("a.txt").unwrap().oid, oid(3));
        assert!(tree.get("gamma").is_none());
    }

    #[test]
    fn test_tree_rejects_bad_names() {
        for name in ["", "foo/bar", "foo\0bar", ".", "..", ".git", ".GIT"] {
            let entries = vec![TreeEntry::blob(name, oid(0))];
            assert!(Tree::new(entries).is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn test_tree_rejects_duplicates() {
        let entries = vec![
            TreeEntry::blob("same", oid(0)),
            TreeEntry::blob("other", oid(0)),
            TreeEntry::tree("same", oid(1)),
        ];
        assert!(matches!(
            Tree::new(entries),
            Err(Error::DuplicateEntryName(name)) if name == "same"
        ));
    }

    #[test]
    fn test_with_entry_inserts_in_order() {
        let tree = Tree::new(vec![
            TreeEntry::blob("a", oid(1)),
            TreeEntry::blob("c", oid(3)),
        ])
        .unwrap();

        let updated = tree.with_entry(TreeEntry::tree("b", oid(2))).unwrap();
        let names: Vec<_> = updated.entries().iter().map(|e| e.name_lossy()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        // original untouched
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_with_entry_replaces_across_modes() {
        let tree = Tree::new(vec![
            TreeEntry::tree("dir", oid(1)),
            TreeEntry::blob("file", oid(2)),
        ])
        .unwrap();

        let updated = tree.with_entry(TreeEntry::blob("dir", oid(9))).unwrap();
        assert_eq!(updated.len(), 2);
        let entry = updated.get("dir").unwrap();
        assert!(!entry.is_tree());
        assert_eq!(entry.oid, oid(9));
    }

    #[test]
    fn test_encode_decode() {
        let tree = Tree::new(vec![
            TreeEntry::blob("README", oid(1)),
            TreeEntry::tree("src", oid(2)),
            TreeEntry::new("run.sh", FileMode::Executable, oid(3)),
            TreeEntry::new("link", FileMode::Symlink, oid(4)),
        ])
        .unwrap();

        let bytes = tree.encode();
        assert!(bytes.starts_with(b"100644 README\0"));

        let decoded = Tree::decode(&bytes).unwrap();
        assert_eq!(tree, decoded);
    }

    #[test]
    fn test_tree_hash_ignores_input_order() {
        // printf hello | git hash-object --stdin
        let blob = compute_object_hash(ObjectKind::Blob, b"hello");
        assert_eq!(blob.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");

        let t1 = Tree::new(vec![
            TreeEntry::blob("README", blob),
            TreeEntry::tree("src", oid(2)),
        ])
        .unwrap();
        let t2 = Tree::new(vec![
            TreeEntry::tree("src", oid(2)),
            TreeEntry::blob("README", blob),
        ])
        .unwrap();

        assert_eq!(
            compute_object_hash(ObjectKind::Tree, &t1.encode()),
            compute_object_hash(ObjectKind::Tree, &t2.encode())
        );
    }

    #[test]
    fn test_decode_keeps_non_utf8_names() {
        let tree = Tree::new(vec![
            TreeEntry::blob(&b"caf\xe9"[..], oid(1)),
            TreeEntry::blob("ok", oid(2)),
        ])
        .unwrap();

        let decoded = Tree::decode(&tree.encode()).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(decoded.get(b"caf\xe9").unwrap().oid, oid(1));
        assert_eq!(decoded.get("ok").unwrap().oid, oid(2));
        assert_eq!(decoded.get(b"caf\xe9").unwrap().name_lossy(), "caf\u{fffd}");
    }

    #[test]
    fn test_decode_truncated() {
        let mut bytes = Tree::new(vec![TreeEntry::blob("f", oid(1))])
            .unwrap()
            .encode();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            Tree::decode(&bytes),
            Err(Error::CorruptObjectMessage(_))
        ));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(FileMode::from_octal(b"40000"), Some(FileMode::Tree));
        assert_eq!(FileMode::from_octal(b"040000"), Some(FileMode::Tree));
        assert_eq!(FileMode::from_octal(b"100644"), Some(FileMode::Blob));
        assert_eq!(FileMode::from_octal(b"100664"), Some(FileMode::Blob));
        assert_eq!(FileMode::from_octal(b"100755"), Some(FileMode::Executable));
        assert_eq!(FileMode::from_octal(b"120000"), Some(FileMode::Symlink));
        assert_eq!(FileMode::from_octal(b"160000"), Some(FileMode::Gitlink));
        assert_eq!(FileMode::from_octal(b"777777"), None);
        assert_eq!(FileMode::from_octal(b"zzz"), None);
    }

    #[test]
    fn test_mode_object_kind() {
        assert_eq!(FileMode::Tree.object_kind(), ObjectKind::Tree);
        assert_eq!(FileMode::Symlink.object_kind(), ObjectKind::Blob);
        assert_eq!(FileMode::Executable.object_kind(), ObjectKind::Blob);
        assert_eq!(FileMode::Gitlink.object_kind(), ObjectKind::Commit);
    }
}
