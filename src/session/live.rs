use std::path::{Path, PathBuf};

use tracing::warn;

use super::{now_timestamp, Session, DEFAULT_BRANCH};
use crate::error::Result;
use crate::fsutil;
use crate::git::GitContext;

pub const LIVE_ID: &str = "live";
pub const LIVE_FILE: &str = "live.json";

/// Caller overrides for a live-session update; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct LiveUpdate {
    pub task: Option<String>,
    pub decisions: Option<Vec<String>>,
    pub next_steps: Option<Vec<String>>,
}

/// The single continuously overwritten session of a project (`sessions/live.json`)
pub struct LiveSessionStore {
    path: PathBuf,
}

impl LiveSessionStore {
    pub fn new(sessions_dir: &Path) -> Self {
        Self {
            path: sessions_dir.join(LIVE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored live session, if any. An unreadable file counts as absent.
    pub async fn read(&self) -> Option<Session> {
        let raw = match fsutil::read_optional(&self.path).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Could not read live session: {}", e);
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!("Ignoring malformed live session: {}", e))
            .ok()
    }

    /// Merge fresh git state with the sticky fields of the previous live session and overwrite it
    pub async fn update(&self, ctx: GitContext, update: LiveUpdate) -> Result<Session> {
        let previous = self.read().await;
        let live = merge_live(previous, ctx, update, now_timestamp());
        fsutil::write_json(&self.path, &live).await?;
        Ok(live)
    }
}

/// Explicit overrides win, then the previous live values, then defaults.
/// Version-control fields always come from `ctx`.
pub fn merge_live(
    previous: Option<Session>,
    ctx: GitContext,
    update: LiveUpdate,
    timestamp: String,
) -> Session {
    let (prev_tool, prev_task, prev_decisions, prev_next) = match previous {
        Some(p) => (p.tool, Some(p.task), Some(p.decisions), Some(p.next_steps)),
        None => (None, None, None, None),
    };

    let task = update
        .task
        .filter(|t| !t.trim().is_empty())
        .or(prev_task.filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| {
            format!(
                "Working on {}",
                ctx.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
            )
        });

    Session {
        id: LIVE_ID.to_string(),
        branch: ctx.branch,
        timestamp,
        tool: prev_tool,
        task,
        decisions: update.decisions.or(prev_decisions).unwrap_or_default(),
        next_steps: update.next_steps.or(prev_next).unwrap_or_default(),
        files_changed: ctx.changed_files,
        diff_summary: ctx.diff_summary,
        recent_commits: ctx.recent_commits,
        head_hash: ctx.head_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(branch: &str, file: &str) -> GitContext {
        GitContext {
            branch: Some(branch.to_string()),
            changed_files: vec![file.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_update_creates_live_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = LiveSessionStore::new(dir.path());

        let live = store
            .update(
                ctx("feature/auth", "src/auth.rs"),
                LiveUpdate {
                    task: Some("Building auth".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(live.id, LIVE_ID);
        assert_eq!(live.task, "Building auth");
        assert_eq!(live.branch.as_deref(), Some("feature/auth"));
        assert_eq!(store.read().await.unwrap(), live);
    }

    #[tokio::test]
    async fn test_sticky_fields_survive_and_git_fields_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = LiveSessionStore::new(dir.path());

        store
            .update(
                ctx("main", "a.rs"),
                LiveUpdate {
                    task: Some("Original task".to_string()),
                    decisions: Some(vec!["Use tokio".to_string()]),
                    next_steps: Some(vec!["Write tests".to_string()]),
                },
            )
            .await
            .unwrap();

        let live = store
            .update(ctx("main", "b.rs"), LiveUpdate::default())
            .await
            .unwrap();

        assert_eq!(live.task, "Original task");
        assert_eq!(live.decisions, vec!["Use tokio"]);
        assert_eq!(live.next_steps, vec!["Write tests"]);
        assert_eq!(live.files_changed, vec!["b.rs"]);
    }

    #[test]
    fn test_default_task_names_branch() {
        let live = merge_live(
            None,
            ctx("develop", "x"),
            LiveUpdate::default(),
            "2026-01-01T00:00:00.000Z".to_string(),
        );
        assert_eq!(live.task, "Working on develop");

        let live = merge_live(
            None,
            GitContext::default(),
            LiveUpdate::default(),
            "2026-01-01T00:00:00.000Z".to_string(),
        );
        assert_eq!(live.task, "Working on main");
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LiveSessionStore::new(dir.path()).read().await.is_none());
    }
}
