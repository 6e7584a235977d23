use std::path::PathBuf;

/// Errors surfaced by the context stores, hooks and watcher
#[derive(Debug, thiserror::Error)]
pub enum CtxError {
    #[error("Not in a ctx project. Run `ctx init` first.")]
    NotInitialized,

    #[error("A watcher is already running for this project (pid {pid})")]
    WatcherAlreadyRunning { pid: u32 },

    #[error("Not a git repository. Git hooks require a git repo.")]
    HookTargetMissing,

    #[error("Unknown tool: \"{0}\". Run `ctx tools list` to see supported tools.")]
    UnknownTool(String),

    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    #[error("Rule file already exists: {}", .0.display())]
    RuleExists(PathBuf),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CtxError>;
