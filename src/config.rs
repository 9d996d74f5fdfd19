use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{flog_debug, Error, Result};

/// Default number of repair iterations allowed per task.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
/// Default sandbox execution timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
/// Default number of concurrent task workers.
pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum repair iterations per task (execution attempts = this + 1).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Sandbox execution timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent task worker limit for batch runs.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory where generated code artifacts are written.
    pub workspace_dir: Option<String>,
    /// Generation backend command (defaults to "claude").
    pub backend_command: Option<String>,
    /// Interpreter used to run generated code (defaults to "python3").
    pub python_command: Option<String>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            workspace_dir: None,
            backend_command: None,
            python_command: None,
        }
    }
}

impl Config {
    pub fn forge_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".forge"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::forge_dir()?.join("forge.toml"))
    }

    pub fn workspace_dir(&self) -> Result<PathBuf> {
        match &self.workspace_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::forge_dir()?.join("workspace")),
        }
    }

    pub fn history_path(&self) -> Result<PathBuf> {
        Ok(Self::forge_dir()?.join("history.jsonl"))
    }

    pub fn effective_backend_command(&self) -> &str {
        self.backend_command.as_deref().unwrap_or("claude")
    }

    pub fn effective_python_command(&self) -> &str {
        self.python_command.as_deref().unwrap_or("python3")
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        flog_debug!(
            "Config loaded: max_iterations={}, timeout_secs={}, workers={}",
            config.max_iterations,
            config.timeout_secs,
            config.workers
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let forge_dir = Self::forge_dir()?;
        flog_debug!("Config::save forge_dir={}", forge_dir.display());
        if !forge_dir.exists() {
            fs::create_dir_all(&forge_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let forge_dir = Self::forge_dir()?;
        let workspace_dir = self.workspace_dir()?;
        if !forge_dir.exists() {
            flog_debug!("Creating forge directory: {}", forge_dir.display());
            fs::create_dir_all(&forge_dir)?;
        }
        if !workspace_dir.exists() {
            flog_debug!("Creating workspace directory: {}", workspace_dir.display());
            fs::create_dir_all(&workspace_dir)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
