use std::path::{Path, PathBuf};

/// Environment variable naming the environment (`development`, `test`, ...).
pub const ENVIRONMENT_VAR: &str = "DOCSHELF_ENV";

/// Environment variable overriding the root directory for database files.
pub const ROOT_DIR_VAR: &str = "DOCSHELF_ROOT";

pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_ROOT_DIR: &str = ".docshelf";

/// Where the engine keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    File(PathBuf),
}

impl ConnectionTarget {
    /// `":memory:"` selects an in-memory database, anything else a file.
    pub fn parse(target: &str) -> Self {
        if target == ":memory:" {
            Self::Memory
        } else {
            Self::File(PathBuf::from(target))
        }
    }
}

/// Database configuration
///
/// Files live under an environment-scoped directory
/// `<root_dir>/.<environment>`, which is created when the database opens.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// In-memory or file database
    pub target: ConnectionTarget,

    /// Environment name, selects the data directory
    pub environment: String,

    /// Parent of the per-environment directories
    pub root_dir: PathBuf,

    /// Create the data directory on open
    pub ensure_data_dir: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            target: ConnectionTarget::Memory,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            ensure_data_dir: true,
        }
    }
}

impl DatabaseConfig {
    /// Configuration from `DOCSHELF_ENV` / `DOCSHELF_ROOT`, falling back to
    /// the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(environment) = lookup(ENVIRONMENT_VAR).filter(|v| !v.trim().is_empty()) {
            config.environment = environment.trim().to_string();
        }

        if let Some(root) = lookup(ROOT_DIR_VAR).filter(|v| !v.trim().is_empty()) {
            config.root_dir = PathBuf::from(root);
        }

        config
    }

    /// In-memory database; nothing is written to disk.
    pub fn in_memory() -> Self {
        Self {
            ensure_data_dir: false,
            ..Self::default()
        }
    }

    /// Set the target
    pub fn target(mut self, target: ConnectionTarget) -> Self {
        self.target = target;
        self
    }

    /// Use a database file. Relative paths resolve inside the data directory.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.target = ConnectionTarget::File(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment name
    pub fn environment(mut self, environment: &str) -> Self {
        self.environment = environment.to_string();
        self
    }

    /// Set the root directory
    pub fn root_dir(mut self, root_dir: impl AsRef<Path>) -> Self {
        self.root_dir = root_dir.as_ref().to_path_buf();
        self
    }

    /// Create the data directory on open
    pub fn ensure_data_dir(mut self, ensure: bool) -> Self {
        self.ensure_data_dir = ensure;
        self
    }

    /// `<root_dir>/.<environment>`
    pub fn data_dir(&self) -> PathBuf {
        self.root_dir.join(format!(".{}", self.environment))
    }

    /// Resolved database file, `None` for in-memory databases.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.target {
            ConnectionTarget::Memory => None,
            ConnectionTarget::File(path) if path.is_absolute() => Some(path.clone()),
            ConnectionTarget::File(path) => Some(self.data_dir().join(path)),
        }
    }

    /// First letter of the environment name, used as the id suffix.
    pub fn environment_tag(&self) -> char {
        self.environment.chars().next().unwrap_or('d')
    }
}
