//! Machine-wide list of ctx projects in `~/.ctx-global/projects.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Project, CTX_DIR};
use crate::error::Result;
use crate::fsutil;
use crate::session::{LiveSessionStore, Session};

pub const GLOBAL_DIR: &str = ".ctx-global";
pub const PROJECTS_FILE: &str = "projects.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Git,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub name: String,
    pub path: PathBuf,
    /// RFC 3339
    pub last_active: String,
    pub branch: Option<String>,
    pub task: Option<String>,
    pub storage: Storage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RegistryFile {
    version: String,
    projects: Vec<ProjectEntry>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            projects: Vec::new(),
        }
    }
}

/// Registry entry enriched with what is on disk right now
#[derive(Debug, Clone)]
pub struct ProjectStatus {
    pub entry: ProjectEntry,
    pub exists: bool,
    pub has_live_session: bool,
}

pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(PROJECTS_FILE),
        }
    }

    /// Registry under the user's home directory, `None` when there is no home
    pub fn global() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(GLOBAL_DIR)))
    }

    async fn load(&self) -> RegistryFile {
        match fsutil::read_optional(&self.path).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", self.path.display(), e);
                RegistryFile::default()
            }),
            Ok(None) => RegistryFile::default(),
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                RegistryFile::default()
            }
        }
    }

    async fn save(&self, file: &RegistryFile) -> Result<()> {
        fsutil::write_json(&self.path, file).await
    }

    /// Add or refresh the entry for `root`
    pub async fn register(&self, root: &Path, branch: Option<String>, storage: Storage) -> Result<()> {
        let mut file = self.load().await;
        let path = absolute(root);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let task = file
            .projects
            .iter()
            .find(|p| p.path == path)
            .and_then(|p| p.task.clone());
        file.projects.retain(|p| p.path != path);
        file.projects.push(ProjectEntry {
            name,
            path: path.clone(),
            last_active: crate::session::now_timestamp(),
            branch,
            task,
            storage,
        });

        self.save(&file).await?;
        debug!("Registered {}", path.display());
        Ok(())
    }

    /// Bump last-active; unknown projects are left unregistered
    pub async fn touch(&self, root: &Path, branch: Option<String>, task: Option<&str>) -> Result<bool> {
        let mut file = self.load().await;
        let path = absolute(root);
        let Some(entry) = file.projects.iter_mut().find(|p| p.path == path) else {
            return Ok(false);
        };

        entry.last_active = crate::session::now_timestamp();
        entry.branch = branch;
        if let Some(task) = task {
            entry.task = Some(task.to_string());
        }
        self.save(&file).await?;
        Ok(true)
    }

    pub async fn unregister(&self, root: &Path) -> Result<bool> {
        let mut file = self.load().await;
        let path = absolute(root);
        let before = file.projects.len();
        file.projects.retain(|p| p.path != path);
        if file.projects.len() == before {
            return Ok(false);
        }
        self.save(&file).await?;
        Ok(true)
    }

    /// Every project, most recently active first. Branch and task come from
    /// the live session when one exists.
    pub async fn list(&self) -> Vec<ProjectStatus> {
        let file = self.load().await;
        let mut out = Vec::with_capacity(file.projects.len());

        for mut entry in file.projects {
            let exists = entry.path.is_dir();
            let live = if exists && entry.path.join(CTX_DIR).is_dir() {
                let project = Project::at(&entry.path);
                LiveSessionStore::new(&project.sessions_dir()).read().await
            } else {
                None
            };

            if let Some(Session { branch, task, .. }) = &live {
                if branch.is_some() {
                    entry.branch = branch.clone();
                }
                if !task.is_empty() {
                    entry.task = Some(task.clone());
                }
            }

            out.push(ProjectStatus {
                entry,
                exists,
                has_live_session: live.is_some(),
            });
        }

        out.sort_by(|a, b| b.entry.last_active.cmp(&a.entry.last_active));
        out
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// "just now", "5m ago", "3h ago", "2d ago", else the date
pub fn time_since(timestamp: &str) -> String {
    let Ok(then) = chrono::DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let seconds = (chrono::Utc::now() - then.with_timezone(&chrono::Utc)).num_seconds();
    match seconds {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s if s < 604_800 => format!("{}d ago", s / 86_400),
        _ => then.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitContext;
    use crate::session::LiveUpdate;

    #[tokio::test]
    async fn test_register_is_upsert() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let registry = Registry::new(home.path());

        registry
            .register(project.path(), Some("main".to_string()), Storage::Git)
            .await
            .unwrap();
        registry
            .register(project.path(), Some("dev".to_string()), Storage::Git)
            .await
            .unwrap();

        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].entry.branch.as_deref(), Some("dev"));
        assert!(list[0].exists);
        assert!(!list[0].has_live_session);
    }

    #[tokio::test]
    async fn test_touch_and_unregister() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let registry = Registry::new(home.path());

        assert!(!registry.touch(project.path(), None, Some("x")).await.unwrap());

        registry.register(project.path(), None, Storage::Local).await.unwrap();
        assert!(registry
            .touch(project.path(), Some("main".to_string()), Some("Refactor"))
            .await
            .unwrap());
        assert_eq!(registry.list().await[0].entry.task.as_deref(), Some("Refactor"));

        assert!(registry.unregister(project.path()).await.unwrap());
        assert!(!registry.unregister(project.path()).await.unwrap());
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_reads_live_session() {
        let home = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let project = Project::init(root.path()).await.unwrap();
        let registry = Registry::new(home.path());
        registry.register(root.path(), None, Storage::Local).await.unwrap();

        LiveSessionStore::new(&project.sessions_dir())
            .update(
                GitContext {
                    branch: Some("feature/x".to_string()),
                    ..Default::default()
                },
                LiveUpdate {
                    task: Some("Ship it".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let list = registry.list().await;
        assert!(list[0].has_live_session);
        assert_eq!(list[0].entry.branch.as_deref(), Some("feature/x"));
        assert_eq!(list[0].entry.task.as_deref(), Some("Ship it"));
    }

    #[tokio::test]
    async fn test_missing_project_is_flagged() {
        let home = tempfile::tempdir().unwrap();
        let registry = Registry::new(home.path());
        let gone = {
            let dir = tempfile::tempdir().unwrap();
            dir.path().to_path_buf()
        };
        registry.register(&gone, None, Storage::Local).await.unwrap();

        let list = registry.list().await;
        assert!(!list[0].exists);
    }

    #[test]
    fn test_time_since() {
        assert_eq!(time_since(&crate::session::now_timestamp()), "just now");
        let old = (chrono::Utc::now() - chrono::Duration::hours(5)).to_rfc3339();
        assert_eq!(time_since(&old), "5h ago");
        assert_eq!(time_since("garbage"), "garbage");
    }
}
