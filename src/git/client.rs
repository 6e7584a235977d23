use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use super::GitContext;

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const RECENT_COMMITS: usize = 5;

/// Why a single git query produced nothing
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("git {0} timed out")]
    Timeout(String),
    #[error("git {args} exited with {status}: {stderr}")]
    Failed {
        args: String,
        status: i32,
        stderr: String,
    },
}

/// Client for querying git via CLI
pub struct GitClient {
    /// Path to git binary
    git_path: String,
    timeout: Duration,
}

impl GitClient {
    pub fn new() -> Self {
        Self {
            git_path: "git".to_string(),
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Run one git command and return its trimmed stdout
    pub async fn query(&self, cwd: &Path, args: &[&str]) -> Result<String, ProbeError> {
        let child = Command::new(&self.git_path)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ProbeError::Timeout(args.join(" ")))??;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                args: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Like `query`, but failures and empty output both become `None`
    async fn query_opt(&self, cwd: &Path, args: &[&str]) -> Option<String> {
        match self.query(cwd, args).await {
            Ok(out) if !out.is_empty() => Some(out),
            Ok(_) => None,
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }

    /// Check if cwd is inside a git working tree
    pub async fn is_repo(&self, cwd: &Path) -> bool {
        self.query_opt(cwd, &["rev-parse", "--is-inside-work-tree"])
            .await
            .is_some_and(|out| out == "true")
    }

    pub async fn branch(&self, cwd: &Path) -> Option<String> {
        self.query_opt(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    pub async fn head_hash(&self, cwd: &Path) -> Option<String> {
        self.query_opt(cwd, &["rev-parse", "--short", "HEAD"]).await
    }

    pub async fn root(&self, cwd: &Path) -> Option<PathBuf> {
        self.query_opt(cwd, &["rev-parse", "--show-toplevel"])
            .await
            .map(PathBuf::from)
    }

    /// Hooks directory, honouring worktrees and `core.hooksPath`
    pub async fn hooks_dir(&self, cwd: &Path) -> Option<PathBuf> {
        let raw = self.query_opt(cwd, &["rev-parse", "--git-path", "hooks"]).await?;
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            Some(path)
        } else {
            Some(cwd.join(path))
        }
    }

    pub async fn diff_summary(&self, cwd: &Path) -> Option<String> {
        let stat = self
            .query_opt(cwd, &["diff", "--stat", "--stat-width=80"])
            .await?;
        stat.lines()
            .last()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
    }

    /// Staged and unstaged changes against HEAD; falls back to the index before the first commit
    pub async fn changed_files(&self, cwd: &Path) -> Vec<String> {
        let out = match self.query_opt(cwd, &["diff", "--name-only", "HEAD"]).await {
            Some(out) => out,
            None => match self.query_opt(cwd, &["diff", "--name-only", "--cached"]).await {
                Some(out) => out,
                None => return Vec::new(),
            },
        };
        split_lines(&out)
    }

    pub async fn recent_commits(&self, cwd: &Path, n: usize) -> Vec<String> {
        let count = format!("-{}", n);
        self.query_opt(cwd, &["log", "--oneline", &count])
            .await
            .map(|out| split_lines(&out))
            .unwrap_or_default()
    }

    /// Snapshot everything the session model needs, concurrently
    pub async fn auto_detect(&self, cwd: &Path) -> GitContext {
        let (branch, diff_summary, changed_files, recent_commits, head_hash) = tokio::join!(
            self.branch(cwd),
            self.diff_summary(cwd),
            self.changed_files(cwd),
            self.recent_commits(cwd, RECENT_COMMITS),
            self.head_hash(cwd),
        );

        GitContext {
            branch,
            diff_summary,
            changed_files,
            recent_commits,
            head_hash,
        }
    }
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

fn split_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_outside_repo_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let client = GitClient::new();

        // Either git is missing or the temp dir is not a repo: both degrade to absent values
        let ctx = client.auto_detect(dir.path()).await;
        assert!(ctx.changed_files.is_empty());
        assert!(ctx.recent_commits.is_empty());
        assert!(ctx.head_hash.is_none());
        assert!(!client.is_repo(dir.path()).await);
    }

    #[tokio::test]
    async fn test_query_reports_failure_kind() {
        let dir = tempfile::tempdir().unwrap();
        let client = GitClient {
            git_path: "definitely-not-a-git-binary".to_string(),
            timeout: QUERY_TIMEOUT,
        };
        let err = client.query(dir.path(), &["status"]).await.unwrap_err();
        assert!(matches!(err, ProbeError::Spawn(_)));
    }

    #[test]
    fn test_split_lines_drops_blanks() {
        assert_eq!(split_lines("a.rs\n\n b.rs \n"), vec!["a.rs", "b.rs"]);
    }
}
