use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CtxError, Result};
use crate::fsutil;
use crate::git::GitContext;

pub const CTX_DIR: &str = ".ctx";
pub const CONFIG_FILE: &str = "config.json";
pub const RULES_DIR: &str = "rules";
pub const SESSIONS_DIR: &str = "sessions";
pub const RESUME_DIR: &str = "resume-prompts";
pub const WATCHER_PID_FILE: &str = "watcher.pid";

/// Tools enabled in a freshly initialized project
pub const DEFAULT_TOOLS: &[&str] = &[
    "claude",
    "cursor",
    "codex",
    "copilot",
    "windsurf",
    "cline",
    "aider",
    "continue",
    "amazonq",
    "zed",
    "antigravity",
];

/// Contents of `.ctx/config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    pub default_tool: Option<String>,
    pub enabled_tools: Vec<String>,
    pub auto_save: bool,
    pub auto_detect: bool,
    pub session_defaults: SessionDefaults,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionDefaults {
    pub include_git_diff: bool,
    pub include_branch: bool,
    pub include_files: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    pub interval_secs: u64,
    pub file_watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            default_tool: None,
            enabled_tools: DEFAULT_TOOLS.iter().map(|s| s.to_string()).collect(),
            auto_save: true,
            auto_detect: true,
            session_defaults: SessionDefaults::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            include_git_diff: true,
            include_branch: true,
            include_files: true,
        }
    }
}

impl SessionDefaults {
    /// Drop the parts of a probe result the project opted out of recording
    pub fn apply(&self, mut ctx: GitContext) -> GitContext {
        if !self.include_branch {
            ctx.branch = None;
        }
        if !self.include_git_diff {
            ctx.diff_summary = None;
        }
        if !self.include_files {
            ctx.changed_files.clear();
        }
        ctx
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            file_watch: true,
        }
    }
}

/// A project with an initialized `.ctx/` data root
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory containing `.ctx/`
    pub root: PathBuf,
    /// The `.ctx/` directory itself
    pub data_dir: PathBuf,
}

impl Project {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data_dir = root.join(CTX_DIR);
        Self { root, data_dir }
    }

    /// Walk up from `start` until a directory containing `.ctx/` is found
    pub fn discover(start: &Path) -> Result<Self> {
        start
            .ancestors()
            .find(|dir| dir.join(CTX_DIR).is_dir())
            .map(Self::at)
            .ok_or(CtxError::NotInitialized)
    }

    /// Discover from the process working directory
    pub fn from_cwd() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::discover(&cwd)
    }

    /// Create the `.ctx/` layout. Existing config and .gitignore are left alone.
    pub async fn init(root: &Path) -> Result<Self> {
        let project = Self::at(root);
        tokio::fs::create_dir_all(project.rules_dir()).await?;
        tokio::fs::create_dir_all(project.sessions_dir()).await?;

        if !project.config_path().exists() {
            fsutil::write_json(&project.config_path(), &Config::default()).await?;
        }

        let gitignore = project.data_dir.join(".gitignore");
        if !gitignore.exists() {
            fsutil::write_atomic(&gitignore, "sessions/\nwatcher.pid\n").await?;
        }

        Ok(project)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.data_dir.join(RULES_DIR)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join(SESSIONS_DIR)
    }

    pub fn resume_dir(&self) -> PathBuf {
        self.data_dir.join(RESUME_DIR)
    }

    pub fn watcher_pid_path(&self) -> PathBuf {
        self.data_dir.join(WATCHER_PID_FILE)
    }

    /// Read the config, falling back to defaults when missing or unreadable
    pub async fn config(&self) -> Config {
        match fsutil::read_optional(&self.config_path()).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", CONFIG_FILE, e);
                Config::default()
            }),
            Ok(None) => Config::default(),
            Err(e) => {
                warn!("Could not read {}: {}", CONFIG_FILE, e);
                Config::default()
            }
        }
    }

    pub async fn write_config(&self, config: &Config) -> Result<()> {
        fsutil::write_json(&self.config_path(), config).await
    }
}
