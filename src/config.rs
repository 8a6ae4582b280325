use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// ref committed to when none is given
pub const DEFAULT_REFNAME: &str = "refs/heads/master";

/// settings read from `libellus.toml` inside the git directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ref that list/read/commit operate on
    pub refname: String,
    /// identity recorded as author and committer
    pub author: Identity,
    /// how many times a commit is rebuilt when the ref moves underneath it
    pub max_commit_attempts: u32,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// load config from file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// apply `GIT_AUTHOR_NAME` / `GIT_AUTHOR_EMAIL` from the environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(name) = env_var("GIT_AUTHOR_NAME") {
            self.author.name = name;
        }
        if let Some(email) = env_var("GIT_AUTHOR_EMAIL") {
            self.author.email = email;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refname: DEFAULT_REFNAME.to_string(),
            author: Identity::default(),
            max_commit_attempts: 8,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var_os(key)
        .map(|v| v.to_string_lossy().to_string())
        .filter(|v| !v.is_empty())
}

/// name and email used for signatures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new("libellus", "libellus@mary.rs")
    }
}
