mod live;

pub use live::{LiveSessionStore, LiveUpdate, LIVE_FILE, LIVE_ID};

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SessionDefaults;
use crate::error::Result;
use crate::fsutil;
use crate::git::{GitContext, VcsProbe};

pub const SESSION_EXT: &str = "json";

/// Branch directory used when git reports no branch
pub const DEFAULT_BRANCH: &str = "main";

/// Ids tried before giving up when other stores keep claiming the same one
const MAX_ID_ATTEMPTS: u32 = 1000;

/// Branch names nest (`feature/auth`), but never deeper than this
const MAX_BRANCH_DEPTH: usize = 16;

/// A point-in-time snapshot of the work in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub branch: Option<String>,
    /// RFC 3339, UTC
    pub timestamp: String,
    /// Tool the session was saved from
    pub tool: Option<String>,
    pub task: String,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    pub diff_summary: Option<String>,
    #[serde(default)]
    pub recent_commits: Vec<String>,
    pub head_hash: Option<String>,
}

impl Session {
    pub fn branch_or_default(&self) -> &str {
        self.branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }
}

/// User-supplied part of a new session
#[derive(Debug, Clone, Default)]
pub struct SessionDraft {
    pub task: String,
    pub tool: Option<String>,
    pub decisions: Vec<String>,
    pub next_steps: Vec<String>,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Map a branch name onto a relative directory, one level per `/` segment
pub fn branch_dir(branch: Option<&str>) -> PathBuf {
    let branch = branch.filter(|b| !b.trim().is_empty()).unwrap_or(DEFAULT_BRANCH);
    branch
        .split('/')
        .map(|seg| match seg {
            "" | "." | ".." => "_",
            s => s,
        })
        .collect()
}

/// Immutable session history under `sessions/<branch>/<id>.json`
pub struct SessionStore {
    root: PathBuf,
    /// Disambiguates ids minted within the same second. Other stores on the
    /// same root are handled by exclusive file creation.
    counter: AtomicU32,
    defaults: SessionDefaults,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: AtomicU32::new(0),
            defaults: SessionDefaults::default(),
        }
    }

    /// Record only the git details the project opted into
    pub fn with_defaults(mut self, defaults: SessionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("sess_{}_{:03}", Utc::now().format("%Y-%m-%dT%H-%M-%S"), n)
    }

    /// Snapshot version control and persist a new session
    pub async fn create<P: VcsProbe>(
        &self,
        probe: &P,
        cwd: &Path,
        draft: SessionDraft,
    ) -> Result<Session> {
        let ctx = probe.probe(cwd).await;
        self.create_from(draft, ctx).await
    }

    pub async fn create_from(&self, draft: SessionDraft, ctx: GitContext) -> Result<Session> {
        let ctx = self.defaults.apply(ctx);
        let mut session = Session {
            id: String::new(),
            branch: ctx.branch,
            timestamp: now_timestamp(),
            tool: draft.tool,
            task: draft.task,
            decisions: draft.decisions,
            next_steps: draft.next_steps,
            files_changed: ctx.changed_files,
            diff_summary: ctx.diff_summary,
            recent_commits: ctx.recent_commits,
            head_hash: ctx.head_hash,
        };

        let dir = self.root.join(branch_dir(session.branch.as_deref()));
        let mut attempts = 0;
        loop {
            session.id = self.next_id();
            let path = dir.join(format!("{}.{}", session.id, SESSION_EXT));
            let mut raw = serde_json::to_string_pretty(&session)?;
            raw.push('\n');

            match fsutil::write_new(&path, &raw).await {
                Ok(()) => {
                    debug!("Saved session {} to {}", session.id, path.display());
                    return Ok(session);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts >= MAX_ID_ATTEMPTS {
                        return Err(e.into());
                    }
                    debug!("Session id {} taken, trying the next one", session.id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Most recent session. With a branch, the lexicographically last file in that
    /// branch directory; otherwise the newest by timestamp across all branches.
    pub async fn latest(&self, branch: Option<&str>) -> Result<Option<Session>> {
        match branch {
            Some(branch) => self.latest_in_branch(branch).await,
            None => Ok(self.list(None).await?.into_iter().next()),
        }
    }

    async fn latest_in_branch(&self, branch: &str) -> Result<Option<Session>> {
        let dir = self.root.join(branch_dir(Some(branch)));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_session_file(&path) && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();

        for path in files.iter().rev() {
            if let Some(session) = read_session_file(path).await {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    /// Every stored session (optionally one branch subtree), newest first
    pub async fn list(&self, branch: Option<&str>) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for path in self.session_files(branch).await? {
            if let Some(session) = read_session_file(&path).await {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.list(None).await?.into_iter().find(|s| s.id == id))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let target = format!("{}.{}", id, SESSION_EXT);
        for path in self.session_files(None).await? {
            if path.file_name().and_then(|n| n.to_str()) == Some(target.as_str()) {
                tokio::fs::remove_file(&path).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flat list of session files under the root or one branch subtree.
    /// The live session file at the root is not part of the history.
    async fn session_files(&self, branch: Option<&str>) -> Result<Vec<PathBuf>> {
        let start = match branch {
            Some(b) => self.root.join(branch_dir(Some(b))),
            None => self.root.clone(),
        };
        let live = self.root.join(LIVE_FILE);

        let files = tokio::task::spawn_blocking(move || {
            if !start.is_dir() {
                return Vec::new();
            }
            WalkDir::new(&start)
                .max_depth(MAX_BRANCH_DEPTH)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_session_file(p) && *p != live)
                .collect::<Vec<_>>()
        })
        .await
        .map_err(std::io::Error::other)?;

        Ok(files)
    }
}

fn is_session_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SESSION_EXT)
        && !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
        && !path.components().any(|c| c == Component::ParentDir)
}

async fn read_session_file(path: &Path) -> Option<Session> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Could not read session {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!("Skipping malformed session {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::StaticProbe;

    fn probe(branch: &str) -> StaticProbe {
        StaticProbe(GitContext {
            branch: Some(branch.to_string()),
            diff_summary: Some("1 file changed".to_string()),
            changed_files: vec!["src/auth.rs".to_string()],
            recent_commits: vec!["abc1234 Add auth".to_string()],
            head_hash: Some("abc1234".to_string()),
        })
    }

    fn draft(task: &str) -> SessionDraft {
        SessionDraft {
            task: task.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_branch_dir() {
        assert_eq!(branch_dir(None), PathBuf::from("main"));
        assert_eq!(branch_dir(Some("feature/auth")), PathBuf::from("feature").join("auth"));
        assert_eq!(branch_dir(Some("../escape")), PathBuf::from("_").join("escape"));
    }

    #[tokio::test]
    async fn test_create_persists_under_branch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let session = store
            .create(&probe("feature/auth"), dir.path(), draft("JWT auth"))
            .await
            .unwrap();

        assert!(session.id.starts_with("sess_"));
        assert_eq!(session.files_changed, vec!["src/auth.rs"]);
        let path = dir
            .path()
            .join("feature")
            .join("auth")
            .join(format!("{}.json", session.id));
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_ids_are_distinct_within_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let p = probe("main");

        let a = store.create(&p, dir.path(), draft("a")).await.unwrap();
        let b = store.create(&p, dir.path(), draft("b")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_separate_stores_on_one_root_keep_every_session() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionStore::new(dir.path());
        let second = SessionStore::new(dir.path());
        let p = probe("main");

        let a = first.create(&p, dir.path(), draft("first")).await.unwrap();
        let b = second.create(&p, dir.path(), draft("second")).await.unwrap();
        assert_ne!(a.id, b.id);

        let mut tasks: Vec<_> = first
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.task)
            .collect();
        tasks.sort();
        assert_eq!(tasks, vec!["first", "second"]);
        assert_eq!(first.get(&a.id).await.unwrap().unwrap().task, "first");
    }

    #[tokio::test]
    async fn test_latest_by_branch_and_across_branches() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        store.create(&probe("main"), dir.path(), draft("first")).await.unwrap();
        let second = store
            .create(&probe("feature/x"), dir.path(), draft("second"))
            .await
            .unwrap();
        let third = store.create(&probe("main"), dir.path(), draft("third")).await.unwrap();

        let on_main = store.latest(Some("main")).await.unwrap().unwrap();
        assert_eq!(on_main.id, third.id);

        let on_feature = store.latest(Some("feature/x")).await.unwrap().unwrap();
        assert_eq!(on_feature.id, second.id);

        let overall = store.latest(None).await.unwrap().unwrap();
        assert_eq!(overall.id, third.id);

        assert!(store.latest(Some("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_skips_live_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create(&probe("main"), dir.path(), draft("kept")).await.unwrap();
        std::fs::write(dir.path().join(LIVE_FILE), "{}").unwrap();
        std::fs::write(dir.path().join("main").join("broken.json"), "not json").unwrap();

        let sessions = store.list(None).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].task, "kept");
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let s = store.create(&probe("dev"), dir.path(), draft("x")).await.unwrap();

        assert_eq!(store.get(&s.id).await.unwrap().unwrap().task, "x");
        assert!(store.delete(&s.id).await.unwrap());
        assert!(!store.delete(&s.id).await.unwrap());
        assert!(store.get(&s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        assert!(store.list(None).await.unwrap().is_empty());
        assert!(store.latest(None).await.unwrap().is_none());
    }
}
