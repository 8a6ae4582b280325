use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::object::pack::{load_packs, Pack};

const CONFIG_FILE: &str = "libellus.toml";

const GIT_CONFIG: &str = "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = true\n";

/// a git directory (bare repository or the `.git` of a work tree)
pub struct Repo {
    path: PathBuf,
    config: Config,
    packs: RwLock<Vec<Arc<Pack>>>,
}

impl Repo {
    /// initialize an empty bare repository at the given path
    pub fn init(path: &Path) -> Result<Self> {
        if path.join("HEAD").exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        for dir in ["objects/info", "objects/pack", "refs/heads", "refs/tags"] {
            let dir = path.join(dir);
            fs::create_dir_all(&dir).with_path(&dir)?;
        }

        let head = path.join("HEAD");
        fs::write(&head, "ref: refs/heads/master\n").with_path(&head)?;
        let git_config = path.join("config");
        fs::write(&git_config, GIT_CONFIG).with_path(&git_config)?;

        debug!(path = %path.display(), "initialized repository");
        Self::open(path)
    }

    /// open an existing repository
    ///
    /// `path` may be a bare repository or a work tree containing `.git`.
    /// settings come from `libellus.toml` in the git directory, with the
    /// author identity overridable through the environment.
    pub fn open(path: &Path) -> Result<Self> {
        let git_dir = find_git_dir(path)?;
        let config = Config::load_or_default(&git_dir.join(CONFIG_FILE))?.with_env_overrides();
        Self::open_git_dir(git_dir, config)
    }

    /// open an existing repository with explicit settings
    pub fn open_with_config(path: &Path, config: Config) -> Result<Self> {
        let git_dir = find_git_dir(path)?;
        Self::open_git_dir(git_dir, config)
    }

    fn open_git_dir(path: PathBuf, config: Config) -> Result<Self> {
        let packs = load_packs(&path.join("objects/pack"))?;
        Ok(Self {
            path,
            config,
            packs: RwLock::new(packs),
        })
    }

    /// git directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// path to libellus.toml
    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE)
    }

    /// path to objects directory
    pub fn objects_path(&self) -> PathBuf {
        self.path.join("objects")
    }

    /// path to pack directory
    pub fn packs_path(&self) -> PathBuf {
        self.objects_path().join("pack")
    }

    /// path to refs directory
    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    /// path to HEAD
    pub fn head_path(&self) -> PathBuf {
        self.path.join("HEAD")
    }

    /// path to packed-refs
    pub fn packed_refs_path(&self) -> PathBuf {
        self.path.join("packed-refs")
    }

    /// packs known at the last scan
    pub fn packs(&self) -> Vec<Arc<Pack>> {
        match self.packs.read() {
            Ok(packs) => packs.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// rescan the pack directory
    ///
    /// returns true if the set of packs changed.
    pub fn reload_packs(&self) -> Result<bool> {
        let fresh = load_packs(&self.packs_path())?;
        let mut packs = match self.packs.write() {
            Ok(packs) => packs,
            Err(poisoned) => poisoned.into_inner(),
        };

        let changed = fresh.len() != packs.len()
            || fresh
                .iter()
                .zip(packs.iter())
                .any(|(a, b)| a.pack_path() != b.pack_path());
        if changed {
            debug!(count = fresh.len(), "pack set changed");
            *packs = fresh;
        }
        Ok(changed)
    }
}

fn find_git_dir(path: &Path) -> Result<PathBuf> {
    let dotgit = path.join(".git");
    if is_git_dir(&dotgit) {
        return Ok(dotgit);
    }
    if is_git_dir(path) {
        return Ok(path.to_path_buf());
    }
    Err(Error::NoRepo(path.to_path_buf()))
}

fn is_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}
