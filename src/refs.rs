use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::lockfile::Lockfile;
use crate::oid::Oid;
use crate::repo::Repo;

/// symbolic refs nested deeper than this are rejected as a loop
const MAX_SYMREF_DEPTH: usize = 5;

/// raw content of a ref before symbolic refs are followed
#[derive(Clone, Debug, PartialEq, Eq)]
enum RefValue {
    Direct(Oid),
    Symbolic(String),
}

/// write a ref unconditionally
///
/// the ref is replaced through `<ref>.lock`, so readers never see a
/// partially written value.
pub fn write_ref(repo: &Repo, ref_name: &str, oid: &Oid) -> Result<()> {
    validate_ref_name(ref_name)?;

    let mut lock = Lockfile::acquire(&ref_path(repo, ref_name))?;
    lock.write(format!("{}\n", oid.to_hex()).as_bytes())?;
    lock.commit()?;

    debug!(ref_name, %oid, "wrote ref");
    Ok(())
}

/// move a ref from `expected` to `new`, failing if it moved meanwhile
///
/// `expected == None` requires the ref not to exist yet. the current value
/// is re-read while `<ref>.lock` is held, so two updates racing from the
/// same starting point cannot both succeed.
pub fn update_ref(repo: &Repo, ref_name: &str, expected: Option<&Oid>, new: &Oid) -> Result<()> {
    validate_ref_name(ref_name)?;

    let mut lock = Lockfile::acquire(&ref_path(repo, ref_name))?;

    let current = match read_raw(repo, ref_name)? {
        Some(RefValue::Direct(oid)) => Some(oid),
        Some(RefValue::Symbolic(target)) => {
            return Err(Error::InvalidRef(format!(
                "{} is a symbolic ref to {}",
                ref_name, target
            )))
        }
        None => None,
    };
    if current.as_ref() != expected {
        debug!(ref_name, ?current, ?expected, "ref moved");
        return Err(Error::StaleRef(ref_name.to_string()));
    }

    lock.write(format!("{}\n", new.to_hex()).as_bytes())?;
    lock.commit()?;

    debug!(ref_name, old = ?current, new = %new, "updated ref");
    Ok(())
}

/// read a ref, following symbolic refs
pub fn read_ref(repo: &Repo, ref_name: &str) -> Result<Oid> {
    match follow(repo, ref_name)? {
        (_, Some(oid)) => Ok(oid),
        (_, None) => Err(Error::RefNotFound(ref_name.to_string())),
    }
}

/// resolve a ref name or hex id to an object id
///
/// 40 hex characters are taken as an id. anything else is expanded the
/// way git does: `<name>`, `refs/<name>`, `refs/tags/<name>`,
/// `refs/heads/<name>`, `refs/remotes/<name>`, `refs/remotes/<name>/HEAD`,
/// and the first candidate that exists wins.
pub fn resolve_ref(repo: &Repo, ref_or_oid: &str) -> Result<Oid> {
    if Oid::looks_like_hex(ref_or_oid) {
        return Oid::from_hex(ref_or_oid);
    }

    for candidate in dwim_candidates(ref_or_oid) {
        if let (_, Some(oid)) = follow(repo, &candidate)? {
            return Ok(oid);
        }
    }
    Err(Error::RefNotFound(ref_or_oid.to_string()))
}

/// full name of the ref that `name` refers to
///
/// symbolic refs are followed, so `HEAD` yields the branch it points at
/// even when that branch has no commits yet. a name that matches nothing
/// is taken as an unborn branch: names under `refs/` are used as given,
/// short names become `refs/heads/<name>`.
pub fn canonical_name(repo: &Repo, name: &str) -> Result<String> {
    validate_ref_name(name)?;

    for candidate in dwim_candidates(name) {
        if read_raw(repo, &candidate)?.is_some() {
            let (target, _) = follow(repo, &candidate)?;
            return Ok(target);
        }
    }

    if name.starts_with("refs/") {
        Ok(name.to_string())
    } else {
        Ok(format!("refs/heads/{}", name))
    }
}

/// list all refs under `refs/`, loose and packed
pub fn list_refs(repo: &Repo) -> Result<Vec<String>> {
    let mut refs = BTreeSet::new();

    let refs_dir = repo.refs_path();
    if refs_dir.is_dir() {
        for entry in WalkDir::new(&refs_dir).min_depth(1) {
            let entry = entry.map_err(|e| Error::Io {
                path: refs_dir.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(repo.path()) else {
                continue;
            };
            let name = rel.to_string_lossy().to_string();
            if validate_ref_name(&name).is_ok() {
                refs.insert(name);
            }
        }
    }

    for (name, _) in read_packed_refs(repo)? {
        refs.insert(name);
    }

    Ok(refs.into_iter().collect())
}

/// check if a ref exists (a symbolic ref counts even if its target does not)
pub fn ref_exists(repo: &Repo, ref_name: &str) -> bool {
    matches!(read_raw(repo, ref_name), Ok(Some(_)))
}

/// names tried for a short ref, in precedence order
pub fn dwim_candidates(name: &str) -> Vec<String> {
    vec![
        name.to_string(),
        format!("refs/{}", name),
        format!("refs/tags/{}", name),
        format!("refs/heads/{}", name),
        format!("refs/remotes/{}", name),
        format!("refs/remotes/{}/HEAD", name),
    ]
}

/// follow symbolic refs from `name`
///
/// returns the last name in the chain and its value, if it has one.
fn follow(repo: &Repo, name: &str) -> Result<(String, Option<Oid>)> {
    let mut current = name.to_string();
    for _ in 0..=MAX_SYMREF_DEPTH {
        match read_raw(repo, &current)? {
            Some(RefValue::Direct(oid)) => return Ok((current, Some(oid))),
            Some(RefValue::Symbolic(target)) => current = target,
            None => return Ok((current, None)),
        }
    }
    Err(Error::InvalidRef(format!(
        "{}: symbolic refs nested too deep",
        name
    )))
}

/// read one ref without following it: loose file first, then packed-refs
fn read_raw(repo: &Repo, name: &str) -> Result<Option<RefValue>> {
    // only refs/ and all-caps names like HEAD live as loose files
    if validate_ref_name(name).is_err() || !(name.starts_with("refs/") || is_pseudo_ref(name)) {
        return Ok(None);
    }

    let path = ref_path(repo, name);
    if !path.is_dir() {
        match fs::read_to_string(&path) {
            Ok(content) => return parse_ref_value(name, &content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io { path, source: e }),
        }
    }

    Ok(read_packed_refs(repo)?
        .into_iter()
        .find(|(packed, _)| packed == name)
        .map(|(_, oid)| RefValue::Direct(oid)))
}

fn parse_ref_value(name: &str, content: &str) -> Result<RefValue> {
    let content = content.trim();
    if let Some(target) = content.strip_prefix("ref:") {
        return Ok(RefValue::Symbolic(target.trim().to_string()));
    }
    Oid::from_hex(content)
        .map(RefValue::Direct)
        .map_err(|_| Error::InvalidRef(format!("{}: malformed ref content", name)))
}

/// entries of the packed-refs file; peeled `^` lines are skipped
fn read_packed_refs(repo: &Repo) -> Result<Vec<(String, Oid)>> {
    let path = repo.packed_refs_path();
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_path(&path),
    };

    let mut refs = Vec::new();
    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let Some((hex, name)) = line.split_once(' ') else {
            continue;
        };
        if let Ok(oid) = Oid::from_hex(hex) {
            refs.push((name.trim().to_string(), oid));
        }
    }
    Ok(refs)
}

fn is_pseudo_ref(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_')
}

/// get filesystem path for a ref
fn ref_path(repo: &Repo, ref_name: &str) -> PathBuf {
    repo.path().join(ref_name)
}

/// validate ref name against git's naming rules
pub fn validate_ref_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidRef(format!("{:?}: {}", name, reason)));

    if name.is_empty() {
        return invalid("empty ref name");
    }
    if name == "@" {
        return invalid("'@' alone is reserved");
    }
    if name.starts_with('/') || name.ends_with('/') {
        return invalid("cannot start or end with '/'");
    }
    if name.ends_with('.') {
        return invalid("cannot end with '.'");
    }
    if name.contains("//") || name.contains("..") || name.contains("@{") {
        return invalid("contains '//', '..' or '@{'");
    }
    if name
        .chars()
        .any(|c| c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return invalid("contains a forbidden character");
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return invalid("component starts with '.'");
        }
        if component.ends_with(".lock") {
            return invalid("component ends with '.lock'");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("repo");
        let repo = Repo::init(&repo_path).unwrap();
        (dir, repo)
    }

    fn oid(byte: u8) -> Oid {
        Oid::from_bytes([byte; 20])
    }

    #[test]
    fn test_write_and_read_ref() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/topic", &oid(1)).unwrap();
        assert_eq!(read_ref(&repo, "refs/heads/topic").unwrap(), oid(1));
        assert_eq!(
            fs::read_to_string(repo.path().join("refs/heads/topic")).unwrap(),
            format!("{}\n", "01".repeat(20))
        );
    }

    #[test]
    fn test_read_nonexistent_ref() {
        let (_dir, repo) = test_repo();

        let result = read_ref(&repo, "refs/heads/nope");
        assert!(matches!(result, Err(Error::RefNotFound(_))));
    }

    #[test]
    fn test_head_is_symbolic() {
        let (_dir, repo) = test_repo();

        // unborn: HEAD exists but master does not
        assert!(ref_exists(&repo, "HEAD"));
        assert!(matches!(read_ref(&repo, "HEAD"), Err(Error::RefNotFound(_))));
        assert_eq!(canonical_name(&repo, "HEAD").unwrap(), "refs/heads/master");

        write_ref(&repo, "refs/heads/master", &oid(2)).unwrap();
        assert_eq!(read_ref(&repo, "HEAD").unwrap(), oid(2));
        assert_eq!(resolve_ref(&repo, "HEAD").unwrap(), oid(2));
    }

    #[test]
    fn test_packed_refs() {
        let (_dir, repo) = test_repo();
        fs::write(
            repo.packed_refs_path(),
            format!(
                "# pack-refs with: peeled fully-peeled sorted \n{} refs/heads/packed\n{} refs/tags/v1\n^{}\n",
                "0a".repeat(20),
                "0b".repeat(20),
                "0c".repeat(20)
            ),
        )
        .unwrap();

        assert_eq!(resolve_ref(&repo, "packed").unwrap(), oid(0x0a));
        assert_eq!(resolve_ref(&repo, "v1").unwrap(), oid(0x0b));
        assert_eq!(canonical_name(&repo, "v1").unwrap(), "refs/tags/v1");

        // a loose ref shadows its packed value
        write_ref(&repo, "refs/heads/packed", &oid(3)).unwrap();
        assert_eq!(read_ref(&repo, "refs/heads/packed").unwrap(), oid(3));
    }

    #[test]
    fn test_dwim_precedence() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/release", &oid(1)).unwrap();
        write_ref(&repo, "refs/tags/release", &oid(2)).unwrap();
        write_ref(&repo, "refs/remotes/origin/HEAD", &oid(3)).unwrap();

        // tags win over heads
        assert_eq!(resolve_ref(&repo, "release").unwrap(), oid(2));
        assert_eq!(canonical_name(&repo, "release").unwrap(), "refs/tags/release");
        assert_eq!(resolve_ref(&repo, "heads/release").unwrap(), oid(1));
        assert_eq!(resolve_ref(&repo, "origin").unwrap(), oid(3));
    }

    #[test]
    fn test_resolve_hex() {
        let (_dir, repo) = test_repo();

        let hex = "abcdef0123456789abcdef0123456789abcdef01";
        assert_eq!(resolve_ref(&repo, hex).unwrap().to_hex(), hex);
    }

    #[test]
    fn test_canonical_name_unborn() {
        let (_dir, repo) = test_repo();

        assert_eq!(canonical_name(&repo, "wiki").unwrap(), "refs/heads/wiki");
        assert_eq!(
            canonical_name(&repo, "refs/notes/commits").unwrap(),
            "refs/notes/commits"
        );
        assert!(matches!(
            canonical_name(&repo, "bad..name"),
            Err(Error::InvalidRef(_))
        ));
    }

    #[test]
    fn test_git_dir_files_are_not_refs() {
        let (_dir, repo) = test_repo();

        // the git `config` file sits at the top of the git dir
        assert!(!ref_exists(&repo, "config"));
        assert!(matches!(resolve_ref(&repo, "config"), Err(Error::RefNotFound(_))));
    }

    #[test]
    fn test_update_ref_cas() {
        let (_dir, repo) = test_repo();
        let name = "refs/heads/master";

        update_ref(&repo, name, None, &oid(1)).unwrap();
        assert!(matches!(
            update_ref(&repo, name, None, &oid(2)),
            Err(Error::StaleRef(_))
        ));

        update_ref(&repo, name, Some(&oid(1)), &oid(2)).unwrap();
        assert!(matches!(
            update_ref(&repo, name, Some(&oid(1)), &oid(3)),
            Err(Error::StaleRef(_))
        ));
        assert_eq!(read_ref(&repo, name).unwrap(), oid(2));

        // failed attempts leave no lock behind
        assert!(!repo.path().join("refs/heads/master.lock").exists());
    }

    #[test]
    fn test_update_ref_sees_packed_value() {
        let (_dir, repo) = test_repo();
        fs::write(
            repo.packed_refs_path(),
            format!("{} refs/heads/master\n", "05".repeat(20)),
        )
        .unwrap();

        assert!(matches!(
            update_ref(&repo, "refs/heads/master", None, &oid(6)),
            Err(Error::StaleRef(_))
        ));
        update_ref(&repo, "refs/heads/master", Some(&oid(5)), &oid(6)).unwrap();
        assert_eq!(read_ref(&repo, "HEAD").unwrap(), oid(6));
    }

    #[test]
    fn test_update_ref_lock_contention() {
        let (_dir, repo) = test_repo();
        let _held = Lockfile::acquire(&repo.path().join("refs/heads/master")).unwrap();

        assert!(matches!(
            update_ref(&repo, "refs/heads/master", None, &oid(1)),
            Err(Error::LockContention(_))
        ));
    }

    #[test]
    fn test_symref_loop() {
        let (_dir, repo) = test_repo();
        fs::write(repo.path().join("refs/heads/a"), "ref: refs/heads/b\n").unwrap();
        fs::write(repo.path().join("refs/heads/b"), "ref: refs/heads/a\n").unwrap();

        assert!(matches!(
            read_ref(&repo, "refs/heads/a"),
            Err(Error::InvalidRef(_))
        ));
    }

    #[test]
    fn test_list_refs() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/a/b/c", &oid(1)).unwrap();
        write_ref(&repo, "refs/tags/x", &oid(1)).unwrap();
        fs::write(
            repo.packed_refs_path(),
            format!("{} refs/heads/packed\n{} refs/tags/x\n", "01".repeat(20), "01".repeat(20)),
        )
        .unwrap();
        let _lock = Lockfile::acquire(&repo.path().join("refs/heads/held")).unwrap();

        assert_eq!(
            list_refs(&repo).unwrap(),
            vec!["refs/heads/a/b/c", "refs/heads/packed", "refs/tags/x"]
        );
    }

    #[test]
    fn test_overwrite_ref() {
        let (_dir, repo) = test_repo();

        write_ref(&repo, "refs/heads/myref", &oid(1)).unwrap();
        write_ref(&repo, "refs/heads/myref", &oid(2)).unwrap();

        assert_eq!(read_ref(&repo, "refs/heads/myref").unwrap(), oid(2));
    }

    #[test]
    fn test_invalid_ref_names() {
        for bad in [
            "",
            "/start",
            "end/",
            "double//slash",
            "with/./dot",
            "with/../dotdot",
            "with\0null",
            "has space",
            "refs/heads/x.lock",
            "refs/.hidden",
            "a@{1}",
            "trailing.",
            "@",
        ] {
            assert!(validate_ref_name(bad).is_err(), "{:?} accepted", bad);
        }

        for good in ["master", "refs/heads/feature/x", "HEAD", "v1.0"] {
            assert!(validate_ref_name(good).is_ok(), "{:?} rejected", good);
        }
    }
}
