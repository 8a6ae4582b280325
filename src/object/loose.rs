use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::oid::{compute_object_hash, object_header, Oid};
use crate::repo::Repo;
use crate::types::ObjectKind;

/// path of a loose object: objects/xx/yyyy...
pub fn loose_path(repo: &Repo, oid: &Oid) -> PathBuf {
    let (dir, file) = oid.to_path_components();
    repo.objects_path().join(dir).join(file)
}

pub fn loose_exists(repo: &Repo, oid: &Oid) -> bool {
    loose_path(repo, oid).is_file()
}

/// write a loose object, returning its id
///
/// the object is compressed into a temp file in its fan-out directory and
/// renamed into place, so readers never observe a partial object.
pub fn write_loose(repo: &Repo, kind: ObjectKind, body: &[u8]) -> Result<Oid> {
    let oid = compute_object_hash(kind, body);
    let (dir, file) = oid.to_path_components();
    let object_dir = repo.objects_path().join(&dir);
    let object_path = object_dir.join(&file);

    // deduplication: identical content is already stored
    if object_path.exists() {
        return Ok(oid);
    }

    fs::create_dir_all(&object_dir).with_path(&object_dir)?;

    let tmp_path = object_dir.join(format!("tmp_obj_{}", uuid::Uuid::new_v4().simple()));
    if let Err(e) = write_compressed(&tmp_path, kind, body) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    move_into_place(&tmp_path, &object_path)?;

    let dir_file = File::open(&object_dir).with_path(&object_dir)?;
    dir_file.sync_all().with_path(&object_dir)?;

    debug!(%oid, %kind, size = body.len(), "wrote loose object");
    Ok(oid)
}

fn write_compressed(path: &Path, kind: ObjectKind, body: &[u8]) -> Result<()> {
    let tmp_file = File::create(path).with_path(path)?;
    let mut encoder = ZlibEncoder::new(tmp_file, Compression::default());
    encoder
        .write_all(&object_header(kind, body.len()))
        .with_path(path)?;
    encoder.write_all(body).with_path(path)?;
    let tmp_file = encoder.finish().with_path(path)?;
    tmp_file.sync_all().with_path(path)
}

/// rename `tmp` to `dest`, removing `tmp` if that fails
fn move_into_place(tmp: &Path, dest: &Path) -> Result<()> {
    if let Err(e) = fs::rename(tmp, dest) {
        let _ = fs::remove_file(tmp);
        return Err(Error::Io {
            path: dest.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

/// read a loose object, or None if it is not stored loose
///
/// the header is checked against the body length; the caller verifies
/// the hash.
pub fn read_loose(repo: &Repo, oid: &Oid) -> Result<Option<(ObjectKind, Vec<u8>)>> {
    let path = loose_path(repo, oid);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io { path, source: e }),
    };

    let mut raw = Vec::new();
    ZlibDecoder::new(file)
        .read_to_end(&mut raw)
        .map_err(|_| Error::CorruptObject(*oid))?;

    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::CorruptObject(*oid))?;
    let header = &raw[..nul];
    let (kind, len) = parse_header(header).ok_or(Error::CorruptObject(*oid))?;
    if raw.len() - nul - 1 != len {
        return Err(Error::CorruptObject(*oid));
    }

    raw.drain(..=nul);
    Ok(Some((kind, raw)))
}

fn parse_header(header: &[u8]) -> Option<(ObjectKind, usize)> {
    let space = header.iter().position(|&b| b == b' ')?;
    let kind = ObjectKind::parse(&header[..space])?;
    let len = std::str::from_utf8(&header[space + 1..]).ok()?.parse().ok()?;
    Some((kind, len))
}

/// ids of every loose object
pub fn list_loose(repo: &Repo) -> Result<Vec<Oid>> {
    let objects = repo.objects_path();
    let mut oids = Vec::new();

    for entry in WalkDir::new(&objects).min_depth(2).max_depth(2) {
        let entry = entry.map_err(|e| Error::Io {
            path: objects.clone(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.file_name().to_string_lossy();
        let dir = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|d| d.to_string_lossy().to_string())
            .unwrap_or_default();
        if dir.len() != 2 || file.len() != 38 {
            continue;
        }
        if let Ok(oid) = Oid::from_hex(&format!("{}{}", dir, file)) {
            oids.push(oid);
        }
    }

    oids.sort();
    Ok(oids)
}
