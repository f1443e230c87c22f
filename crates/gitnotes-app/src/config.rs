use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use gitnotes_core::{Identity, RepositoryDescriptor, is_path_safe_name};
use gitnotes_store_git::DEFAULT_INITIAL_BRANCH;
use serde::Deserialize;

use crate::credentials::CREDENTIALS_FILE;
use crate::engine::SyncSettings;
use crate::note_store::NOTES_FILE;

/// Directory under the platform config dir holding [`CONFIG_FILE`].
pub const CONFIG_DIR: &str = "gitnotes";
/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";
/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 4;
/// Scratch directory name under the storage root.
pub const SCRATCH_DIR: &str = "scratch";

/// Entries under the storage root that belong to gitnotes itself, not to a repository.
pub const RESERVED_NAMES: [&str; 3] = [SCRATCH_DIR, NOTES_FILE, CREDENTIALS_FILE];

/// Whether `name` would collide with one of [`RESERVED_NAMES`].
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    let name = name.trim();
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Top-level application configuration loaded from `config.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

impl AppConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, is not valid TOML, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    /// Returns an error when the text is not valid TOML or fails validation.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if !is_path_safe_name(&repo.name) {
                bail!("repository name {:?} cannot be used as a directory name", repo.name);
            }
            if is_reserved_name(&repo.name) {
                bail!("repository name {:?} is reserved for gitnotes' own files", repo.name);
            }
            if !seen.insert(repo.name.as_str()) {
                bail!("duplicate repository detected: {}", repo.name);
            }
        }
        Ok(())
    }

    /// Storage root: the configured one or `default_root`.
    #[must_use]
    pub fn storage_root(&self, default_root: &Path) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| default_root.to_path_buf())
    }

    /// Engine settings for repositories stored under `root`.
    ///
    /// Scratch clones go to the configured scratch directory or `<root>/scratch`.
    #[must_use]
    pub fn sync_settings(&self, root: &Path) -> SyncSettings {
        let scratch = self
            .storage
            .scratch
            .clone()
            .unwrap_or_else(|| root.join(SCRATCH_DIR));
        SyncSettings {
            root: root.to_path_buf(),
            scratch,
            branch: self.sync.branch.clone(),
            initial_branch: self.sync.initial_branch.clone(),
            timeout: self.sync.timeout(),
            identity: self.identity.clone(),
        }
    }

    /// Find a configured repository by name.
    #[must_use]
    pub fn repository(&self, name: &str) -> Option<RepositoryDescriptor> {
        self.repositories
            .iter()
            .find(|repo| repo.name == name)
            .map(RepositoryConfig::descriptor)
    }
}

/// `[storage]` block.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub scratch: Option<PathBuf>,
}

/// `[sync]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_initial_branch")]
    pub initial_branch: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            branch: None,
            initial_branch: default_initial_branch(),
            timeout_secs: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl SyncConfig {
    /// Transport deadline per operation.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.branch.as_deref().is_some_and(|b| b.trim().is_empty()) {
            bail!("sync.branch must not be empty");
        }
        if self.initial_branch.trim().is_empty() {
            bail!("sync.initial_branch must not be empty");
        }
        if self.timeout_secs == Some(0) {
            bail!("sync.timeout_secs must be greater than zero");
        }
        if self.workers == 0 {
            bail!("sync.workers must be greater than zero");
        }
        Ok(())
    }
}

fn default_initial_branch() -> String {
    DEFAULT_INITIAL_BRANCH.to_owned()
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// `[[repositories]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    #[serde(default)]
    pub remote_url: String,
    #[serde(default)]
    pub profile: String,
}

impl RepositoryConfig {
    /// Descriptor handed to the sync engine.
    #[must_use]
    pub fn descriptor(&self) -> RepositoryDescriptor {
        RepositoryDescriptor::new(&self.profile, &self.name, &self.remote_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_config_returns_defaults() -> Result<()> {
        let dir = tempdir()?;
        let cfg = AppConfig::load(dir.path().join(CONFIG_FILE))?;
        assert_eq!(cfg.sync.initial_branch, "master");
        assert_eq!(cfg.sync.workers, DEFAULT_WORKERS);
        assert!(cfg.sync.branch.is_none());
        assert!(cfg.identity.is_none());

        let settings = cfg.sync_settings(Path::new("/data/gitnotes"));
        assert_eq!(settings.root, Path::new("/data/gitnotes"));
        assert_eq!(settings.scratch, Path::new("/data/gitnotes/scratch"));
        assert!(settings.timeout.is_none());
        Ok(())
    }

    #[test]
    fn load_full_config() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        let mut file = fs::File::create(&path)?;
        writeln!(
            file,
            "[storage]\nroot = \"/srv/notes\"\n\n[sync]\nbranch = \"main\"\ntimeout_secs = 30\nworkers = 2\n\n[identity]\nname = \"Jane\"\nemail = \"jane@example.invalid\"\n\n[[repositories]]\nname = \"notes\"\nremote_url = \"https://example.invalid/jane/notes.git\"\nprofile = \"jane\""
        )?;

        let cfg = AppConfig::load(&path)?;
        let settings = cfg.sync_settings(&cfg.storage_root(Path::new("/unused")));
        assert_eq!(settings.root, Path::new("/srv/notes"));
        assert_eq!(settings.branch.as_deref(), Some("main"));
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.sync.workers, 2);
        assert_eq!(cfg.identity.as_ref().map(|id| id.name.as_str()), Some("Jane"));

        let Some(repo) = cfg.repository("notes") else {
            panic!("configured repository");
        };
        assert_eq!(repo.remote(), Some("https://example.invalid/jane/notes.git"));
        assert_eq!(repo.profile, "jane");
        assert!(cfg.repository("other").is_none());
        Ok(())
    }

    #[test]
    fn duplicate_repositories_are_rejected() {
        let Err(err) = AppConfig::from_toml("[[repositories]]\nname = \"a\"\n\n[[repositories]]\nname = \"a\"")
        else {
            panic!("duplicate repository should error");
        };
        assert!(err.to_string().contains("duplicate repository"));
    }

    #[test]
    fn unsafe_repository_names_are_rejected() {
        let Err(err) = AppConfig::from_toml("[[repositories]]\nname = \"../escape\"") else {
            panic!("path-unsafe name should error");
        };
        assert!(err.to_string().contains("directory name"));
    }

    #[test]
    fn reserved_repository_names_are_rejected() {
        for name in ["scratch", "notes.json", "Credentials.json"] {
            let Err(err) = AppConfig::from_toml(&format!("[[repositories]]\nname = \"{name}\"")) else {
                panic!("{name} should be rejected");
            };
            assert!(err.to_string().contains("reserved"), "{err}");
        }
        assert!(!is_reserved_name("scratchpad"));
    }

    #[test]
    fn zero_workers_and_timeout_are_rejected() {
        assert!(AppConfig::from_toml("[sync]\nworkers = 0").is_err());
        assert!(AppConfig::from_toml("[sync]\ntimeout_secs = 0").is_err());
        assert!(AppConfig::from_toml("[sync]\nbranch = \"  \"").is_err());
    }
}
