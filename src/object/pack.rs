use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::bufread::ZlibDecoder;
use tracing::{debug, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::object::delta::apply_delta;
use crate::oid::Oid;
use crate::types::ObjectKind;

const IDX_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const IDX_VERSION: u32 = 2;
const IDX_HEADER_SIZE: usize = 8;
const FANOUT_SIZE: usize = 256 * 4;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;
const PACK_HEADER_SIZE: usize = 12;

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

/// longest delta chain followed before the pack is treated as corrupt
const MAX_DELTA_DEPTH: usize = 4096;

/// a `.pack` file together with its v2 `.idx`
///
/// the index is held in memory; entries are read from the pack with
/// positioned reads so a pack can be shared between threads.
pub struct Pack {
    pack_path: PathBuf,
    index: Vec<u8>,
    count: usize,
    file: File,
}

/// pack entry with its header decoded
enum Entry {
    Base(ObjectKind),
    OfsDelta(u64),
    RefDelta(Oid),
}

impl Pack {
    /// open a pack by its index path; the pack sits next to it
    pub fn open(idx_path: &Path) -> Result<Self> {
        let index = fs::read(idx_path).with_path(idx_path)?;
        let count = parse_index(&index).map_err(|msg| bad_pack(idx_path, msg))?;

        let pack_path = idx_path.with_extension("pack");
        let file = File::open(&pack_path).with_path(&pack_path)?;

        let mut header = [0u8; PACK_HEADER_SIZE];
        file.read_exact_at(&mut header, 0).with_path(&pack_path)?;
        if &header[..4] != b"PACK" {
            return Err(bad_pack(&pack_path, "bad pack signature"));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != 2 && version != 3 {
            return Err(bad_pack(&pack_path, "unsupported pack version"));
        }
        let pack_count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        if pack_count as usize != count {
            return Err(bad_pack(&pack_path, "pack and index disagree on object count"));
        }

        Ok(Self {
            pack_path,
            index,
            count,
            file,
        })
    }

    /// path of the `.pack` file
    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }

    /// number of objects in the pack
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.position(oid).is_some()
    }

    /// object ids in index order
    pub fn oids(&self) -> impl Iterator<Item = Oid> + '_ {
        (0..self.count).map(move |i| {
            let mut bytes = [0u8; Oid::LEN];
            bytes.copy_from_slice(self.oid_at(i));
            Oid::from_bytes(bytes)
        })
    }

    /// read and fully resolve an object
    ///
    /// `external` resolves REF_DELTA bases that are not in this pack.
    pub fn read(
        &self,
        oid: &Oid,
        external: &dyn Fn(&Oid) -> Result<(ObjectKind, Vec<u8>)>,
    ) -> Result<Option<(ObjectKind, Vec<u8>)>> {
        match self.position(oid) {
            Some(i) => {
                let offset = self.offset_at(i)?;
                self.read_at_offset(offset, external).map(Some)
            }
            None => Ok(None),
        }
    }

    fn read_at_offset(
        &self,
        mut offset: u64,
        external: &dyn Fn(&Oid) -> Result<(ObjectKind, Vec<u8>)>,
    ) -> Result<(ObjectKind, Vec<u8>)> {
        let mut deltas = Vec::new();

        let (kind, mut data) = loop {
            if deltas.len() > MAX_DELTA_DEPTH {
                return Err(bad_pack(&self.pack_path, "delta chain too deep"));
            }

            let (entry, body) = self.read_entry(offset)?;
            match entry {
                Entry::Base(kind) => break (kind, body),
                Entry::OfsDelta(base_offset) => {
                    deltas.push(body);
                    offset = base_offset;
                }
                Entry::RefDelta(base) => {
                    deltas.push(body);
                    match self.position(&base) {
                        Some(i) => offset = self.offset_at(i)?,
                        None => break external(&base)?,
                    }
                }
            }
        };

        for delta in deltas.iter().rev() {
            data = apply_delta(&data, delta)?;
        }
        Ok((kind, data))
    }

    /// decode the entry header at `offset` and inflate its payload
    fn read_entry(&self, offset: u64) -> Result<(Entry, Vec<u8>)> {
        let mut reader = BufReader::new(PackReader {
            file: &self.file,
            pos: offset,
        });

        let mut byte = self.next_byte(&mut reader)?;
        let type_code = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0f) as u64;
        let mut shift = 4;
        while byte & 0x80 != 0 {
            byte = self.next_byte(&mut reader)?;
            if shift > 57 {
                return Err(bad_pack(&self.pack_path, "entry size overflow"));
            }
            size |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }

        let entry = match type_code {
            OFS_DELTA => {
                byte = self.next_byte(&mut reader)?;
                let mut distance = (byte & 0x7f) as u64;
                while byte & 0x80 != 0 {
                    byte = self.next_byte(&mut reader)?;
                    distance = distance
                        .checked_add(1)
                        .and_then(|d| d.checked_mul(128))
                        .ok_or_else(|| bad_pack(&self.pack_path, "delta offset overflow"))?
                        | (byte & 0x7f) as u64;
                }
                if distance == 0 || distance > offset {
                    return Err(bad_pack(&self.pack_path, "delta base outside pack"));
                }
                Entry::OfsDelta(offset - distance)
            }
            REF_DELTA => {
                let mut base = [0u8; Oid::LEN];
                reader
                    .read_exact(&mut base)
                    .map_err(|e| self.read_error(e))?;
                Entry::RefDelta(Oid::from_bytes(base))
            }
            code => match ObjectKind::from_pack_type(code) {
                Some(kind) => Entry::Base(kind),
                None => return Err(bad_pack(&self.pack_path, "unknown entry type")),
            },
        };

        let size = usize::try_from(size)
            .map_err(|_| bad_pack(&self.pack_path, "entry too large"))?;
        let mut body = Vec::with_capacity(size.min(1 << 20));
        let mut decoder = ZlibDecoder::new(reader);
        (&mut decoder)
            .take(size as u64)
            .read_to_end(&mut body)
            .map_err(|e| self.read_error(e))?;
        if body.len() != size {
            return Err(bad_pack(&self.pack_path, "entry shorter than declared"));
        }

        Ok((entry, body))
    }

    fn next_byte<R: BufRead>(&self, reader: &mut R) -> Result<u8> {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .map_err(|e| self.read_error(e))?;
        Ok(byte[0])
    }

    fn read_error(&self, e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                bad_pack(&self.pack_path, "truncated or malformed entry")
            }
            _ => Error::Io {
                path: self.pack_path.clone(),
                source: e,
            },
        }
    }

    fn fanout(&self, byte: usize) -> usize {
        let at = IDX_HEADER_SIZE + byte * 4;
        be_u32(&self.index[at..at + 4]) as usize
    }

    fn oid_at(&self, i: usize) -> &[u8] {
        let at = IDX_HEADER_SIZE + FANOUT_SIZE + i * Oid::LEN;
        &self.index[at..at + Oid::LEN]
    }

    fn position(&self, oid: &Oid) -> Option<usize> {
        let first = oid.as_bytes()[0] as usize;
        let lo = if first == 0 { 0 } else { self.fanout(first - 1) };
        let hi = self.fanout(first);
        if lo > hi {
            return None;
        }

        let target = &oid.as_bytes()[..];
        let (mut lo, mut hi) = (lo, hi);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_at(mid).cmp(target) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    fn offset_at(&self, i: usize) -> Result<u64> {
        let offsets = IDX_HEADER_SIZE + FANOUT_SIZE + self.count * (Oid::LEN + 4);
        let at = offsets + i * 4;
        let raw = be_u32(&self.index[at..at + 4]);
        if raw & LARGE_OFFSET_FLAG == 0 {
            return Ok(raw as u64);
        }

        let large = offsets + self.count * 4 + (raw & !LARGE_OFFSET_FLAG) as usize * 8;
        let bytes = self
            .index
            .get(large..large + 8)
            .ok_or_else(|| bad_pack(&self.pack_path, "large offset outside index"))?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }
}

/// sequential reads over a shared pack file
struct PackReader<'a> {
    file: &'a File,
    pos: u64,
}

impl Read for PackReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// validate an index and return its object count
fn parse_index(index: &[u8]) -> std::result::Result<usize, &'static str> {
    if index.len() < IDX_HEADER_SIZE + FANOUT_SIZE {
        return Err("index too short");
    }
    if index[..4] != IDX_MAGIC {
        return Err("not a v2 pack index");
    }
    if be_u32(&index[4..8]) != IDX_VERSION {
        return Err("unsupported pack index version");
    }

    let mut prev = 0;
    for i in 0..256 {
        let at = IDX_HEADER_SIZE + i * 4;
        let value = be_u32(&index[at..at + 4]);
        if value < prev {
            return Err("fanout not monotonic");
        }
        prev = value;
    }

    let count = prev as usize;
    // oids + crc32 + offsets, then the two trailing checksums
    let min_len = IDX_HEADER_SIZE + FANOUT_SIZE + count * (Oid::LEN + 8) + 2 * Oid::LEN;
    if index.len() < min_len {
        return Err("index truncated");
    }
    Ok(count)
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn bad_pack(path: &Path, message: &str) -> Error {
    Error::CorruptObjectMessage(format!("{}: {}", path.display(), message))
}

/// open every pack in `dir` that has both an index and a pack file
///
/// packs that fail to open are skipped with a warning, so a pack being
/// written by another process does not make the repository unreadable.
pub fn load_packs(dir: &Path) -> Result<Vec<Arc<Pack>>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut idx_paths = Vec::new();
    for entry in fs::read_dir(dir).with_path(dir)? {
        let path = entry.with_path(dir)?.path();
        if path.extension().is_some_and(|ext| ext == "idx") && path.with_extension("pack").is_file()
        {
            idx_paths.push(path);
        }
    }
    idx_paths.sort();

    let mut packs = Vec::with_capacity(idx_paths.len());
    for idx_path in idx_paths {
        match Pack::open(&idx_path) {
            Ok(pack) => {
                debug!(path = %idx_path.display(), objects = pack.len(), "loaded pack");
                packs.push(Arc::new(pack));
            }
            Err(e) => warn!(path = %idx_path.display(), error = %e, "skipping unreadable pack"),
        }
    }
    Ok(packs)
}
