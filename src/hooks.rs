use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CtxError, Result};
use crate::fsutil;
use crate::git::GitClient;

/// Delimits the injected block; appears exactly twice in an installed hook
pub const HOOK_MARKER: &str = "# --- context-bridge auto-refresh ---";

pub const HOOK_NAMES: [&str; 3] = ["post-commit", "post-checkout", "post-merge"];

const SHEBANG: &str = "#!/bin/sh";

/// Block appended to each hook: refresh in the background, never block git
fn hook_block() -> String {
    format!(
        "{marker}\n\
         # Keeps .ctx/sessions/live.json and .ctx/resume-prompts/ current.\n\
         # Remove with: ctx hooks uninstall\n\
         if command -v ctx >/dev/null 2>&1; then\n  \
         ctx refresh --quiet >/dev/null 2>&1 &\n\
         fi\n\
         {marker}\n",
        marker = HOOK_MARKER
    )
}

/// Installs and removes the marked refresh block in git lifecycle hooks
pub struct HookInstaller {
    hooks_dir: PathBuf,
}

impl HookInstaller {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
        }
    }

    /// Resolve the hooks directory of the repository containing `cwd`
    pub async fn for_repo(git: &GitClient, cwd: &Path) -> Result<Self> {
        if !git.is_repo(cwd).await {
            return Err(CtxError::HookTargetMissing);
        }
        let hooks_dir = match git.hooks_dir(cwd).await {
            Some(dir) => dir,
            None => git
                .root(cwd)
                .await
                .ok_or(CtxError::HookTargetMissing)?
                .join(".git")
                .join("hooks"),
        };
        Ok(Self::new(hooks_dir))
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    /// Append the refresh block to every hook that lacks it; returns the hooks changed
    pub async fn install(&self) -> Result<Vec<&'static str>> {
        tokio::fs::create_dir_all(&self.hooks_dir).await?;

        let mut installed = Vec::new();
        for name in HOOK_NAMES {
            let path = self.hooks_dir.join(name);
            let existing = fsutil::read_optional(&path).await?.unwrap_or_default();

            if existing.contains(HOOK_MARKER) {
                debug!("{} already has the refresh block", name);
                continue;
            }

            let content = if existing.trim().is_empty() {
                format!("{}\n\n{}", SHEBANG, hook_block())
            } else {
                format!("{}\n\n{}", existing.trim_end(), hook_block())
            };

            tokio::fs::write(&path, content).await?;
            make_executable(&path).await?;
            installed.push(name);
        }

        if !installed.is_empty() {
            info!("Installed git hooks: {}", installed.join(", "));
        }
        Ok(installed)
    }

    /// Remove the refresh block, keeping any other hook content.
    /// A hook left with nothing but a shebang is deleted.
    pub async fn uninstall(&self) -> Result<Vec<&'static str>> {
        let mut removed = Vec::new();
        for name in HOOK_NAMES {
            let path = self.hooks_dir.join(name);
            let Some(content) = fsutil::read_optional(&path).await? else {
                continue;
            };
            let Some(stripped) = remove_marked_blocks(&content) else {
                continue;
            };

            let rest = stripped.trim();
            if rest.is_empty() || rest == SHEBANG {
                tokio::fs::remove_file(&path).await?;
            } else {
                tokio::fs::write(&path, stripped).await?;
            }
            removed.push(name);
        }
        Ok(removed)
    }

    /// Per hook, whether the refresh block is present
    pub async fn status(&self) -> Result<Vec<(&'static str, bool)>> {
        let mut status = Vec::with_capacity(HOOK_NAMES.len());
        for name in HOOK_NAMES {
            let content = fsutil::read_optional(&self.hooks_dir.join(name)).await?;
            status.push((name, content.is_some_and(|c| c.contains(HOOK_MARKER))));
        }
        Ok(status)
    }
}

/// Cut every marker-delimited block (markers included).
/// `None` when there is no complete block.
fn remove_marked_blocks(content: &str) -> Option<String> {
    let mut out = content.to_string();
    let mut changed = false;

    while let Some(start) = out.find(HOOK_MARKER) {
        let after_open = start + HOOK_MARKER.len();
        let Some(rel_end) = out[after_open..].find(HOOK_MARKER) else {
            break;
        };
        let mut end = after_open + rel_end + HOOK_MARKER.len();
        if out[end..].starts_with('\n') {
            end += 1;
        }
        let start = out[..start].trim_end_matches('\n').len();
        let prefix_nl = if start > 0 { "\n" } else { "" };
        out.replace_range(start..end, prefix_nl);
        changed = true;
    }

    changed.then_some(out)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
