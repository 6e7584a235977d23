mod client;

pub use client::GitClient;

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Version-control state captured at one point in time.
/// Every field is optional: a failed query leaves it absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitContext {
    pub branch: Option<String>,
    /// Last line of `git diff --stat`, e.g. "4 files changed, 127 insertions(+)"
    pub diff_summary: Option<String>,
    pub changed_files: Vec<String>,
    /// `git log --oneline` lines, newest first
    pub recent_commits: Vec<String>,
    pub head_hash: Option<String>,
}

/// Read-only source of version-control state. Implementations never fail.
pub trait VcsProbe: Send + Sync {
    fn probe(&self, cwd: &Path) -> impl Future<Output = GitContext> + Send;
}

impl VcsProbe for GitClient {
    fn probe(&self, cwd: &Path) -> impl Future<Output = GitContext> + Send {
        self.auto_detect(cwd)
    }
}

/// Probe that always returns the same context
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub GitContext);

#[cfg(test)]
impl VcsProbe for StaticProbe {
    fn probe(&self, _cwd: &Path) -> impl Future<Output = GitContext> + Send {
        std::future::ready(self.0.clone())
    }
}
