use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};

/// exclusive `<file>.lock` held while a file is replaced
///
/// the lock is created with create-new semantics, so git and other
/// libellus handles honour it. new content is written into the lock and
/// `commit` renames it over the target. dropping an uncommitted lock
/// removes it and leaves the target untouched.
pub struct Lockfile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
}

impl Lockfile {
    /// take the lock for `target`, failing with `LockContention` if held
    pub fn acquire(target: &Path) -> Result<Self> {
        let mut lock_path = OsString::from(target.as_os_str());
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::LockContention(lock_path.clone())
                } else {
                    Error::Io {
                        path: lock_path.clone(),
                        source: e,
                    }
                }
            })?;

        Ok(Self {
            target: target.to_path_buf(),
            lock_path,
            file: Some(file),
        })
    }

    /// file being protected
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// path of the lock file itself
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// append content to the pending replacement
    pub fn write(&mut self, content: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::LockContention(self.lock_path.clone()))?;
        file.write_all(content).with_path(&self.lock_path)
    }

    /// fsync and rename the lock over the target
    pub fn commit(mut self) -> Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| Error::LockContention(self.lock_path.clone()))?;
        let synced = file.sync_all().with_path(&self.lock_path);
        drop(file);

        let renamed =
            synced.and_then(|_| fs::rename(&self.lock_path, &self.target).with_path(&self.target));
        if let Err(e) = renamed {
            let _ = fs::remove_file(&self.lock_path);
            return Err(e);
        }

        if let Some(parent) = self.target.parent() {
            let dir = File::open(parent).with_path(parent)?;
            dir.sync_all().with_path(parent)?;
        }

        Ok(())
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        // still holding the file means commit never ran
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
