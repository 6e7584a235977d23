use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{header, notice, success};
use crate::adapters;
use crate::config::{Project, CTX_DIR};
use crate::error::CtxError;
use crate::git::GitClient;
use crate::hooks::HookInstaller;
use crate::refresh::RefreshPipeline;
use crate::registry::{Registry, Storage};
use crate::rules::RuleStore;
use crate::session::LiveUpdate;

const STARTER_RULE: &str = "# Project Overview

<!-- Edit this file with your project's context -->
<!-- It is synced to all your AI coding tools -->

## Stack
-

## Key Conventions
-

## Important Files
-
";

#[derive(Debug, Clone, Copy, Default)]
pub struct InitArgs {
    pub no_import: bool,
    pub no_hooks: bool,
}

/// Create `.ctx/` in `cwd`, import existing tool configs, install hooks,
/// register globally and write the first live session. Only the directory
/// layout is required to succeed; every later step degrades to a warning.
pub async fn init(cwd: &Path, args: InitArgs, registry: Option<&Registry>) -> Result<Project> {
    if cwd.join(CTX_DIR).is_dir() {
        notice(".ctx/ already exists in this directory.");
        return Ok(Project::at(cwd));
    }

    let project = Project::init(cwd)
        .await
        .with_context(|| format!("Failed to create {} in {}", CTX_DIR, cwd.display()))?;
    success(format!("Initialized {}/ in {}", CTX_DIR, cwd.display()));

    let git = GitClient::new();
    let is_git = git.is_repo(cwd).await;
    if is_git {
        println!("  Git repo detected: sessions are organized by branch.");
        if !args.no_hooks {
            install_hooks(&git, cwd).await;
        }
    } else {
        println!("  Not a git repo: sessions use \"main\" as their branch.");
    }

    if let Some(registry) = registry {
        let storage = if is_git { Storage::Git } else { Storage::Local };
        match registry.register(cwd, git.branch(cwd).await, storage).await {
            Ok(()) => success("Registered in the global project registry"),
            Err(e) => warn!("Could not register project: {}", e),
        }
    }

    let rules = RuleStore::new(project.rules_dir());
    if !args.no_import {
        import_existing(&rules, cwd).await?;
    }

    match rules.add("project", STARTER_RULE, Some(1)).await {
        Ok(path) => success(format!("Created starter rule: {}", path.display())),
        Err(CtxError::RuleExists(path)) => debug!("Keeping existing {}", path.display()),
        Err(e) => return Err(e.into()),
    }

    let pipeline = RefreshPipeline::new(project.clone(), git);
    match pipeline.refresh(LiveUpdate::default()).await {
        Ok(outcome) => success(format!(
            "Pre-generated {} resume prompts in {}/resume-prompts/",
            outcome.resume_count, CTX_DIR
        )),
        Err(e) => warn!("Initial refresh failed: {}", e),
    }

    header("Autonomous context");
    if is_git && !args.no_hooks {
        println!("  Git hooks refresh context on commit, checkout and merge.");
    }
    println!("  Live session: {}/sessions/live.json", CTX_DIR);
    println!("  Resume prompts: {}/resume-prompts/<tool>.md", CTX_DIR);
    println!("  Run `ctx watch` for continuous background updates.");

    Ok(project)
}

async fn install_hooks(git: &GitClient, cwd: &Path) {
    let installer = match HookInstaller::for_repo(git, cwd).await {
        Ok(installer) => installer,
        Err(e) => {
            warn!("Could not install git hooks: {}", e);
            return;
        }
    };
    match installer.install().await {
        Ok(installed) if !installed.is_empty() => {
            success(format!("Installed git hooks: {}", installed.join(", ")));
        }
        Ok(_) => {}
        Err(e) => warn!("Could not install git hooks: {}", e),
    }
}

async fn import_existing(rules: &RuleStore, cwd: &Path) -> Result<()> {
    let mut imported = 0;
    for adapter in adapters::all() {
        let profile = adapter.profile();
        let Some(content) = adapter.import_existing(cwd) else {
            continue;
        };
        match rules
            .add(&format!("imported-{}", profile.name), &content, None)
            .await
        {
            Ok(_) => {
                success(format!("Imported rules from {}", profile.display_name));
                imported += 1;
            }
            Err(CtxError::RuleExists(path)) => debug!("Skipping import, {} exists", path.display()),
            Err(e) => return Err(e.into()),
        }
    }
    if imported == 0 {
        println!("  No existing tool configs found to import.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_imports_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CLAUDE.md"), "Use tabs.\n").unwrap();
        let registry = Registry::new(home.path());

        let project = init(dir.path(), InitArgs::default(), Some(&registry))
            .await
            .unwrap();

        let rules = RuleStore::new(project.rules_dir()).read().await.unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert!(names.contains(&"project"));
        assert!(names.contains(&"imported-claude"));

        assert_eq!(registry.list().await.len(), 1);
        assert!(project.sessions_dir().join("live.json").is_file());
        assert!(project.resume_dir().join("claude.md").is_file());
    }

    #[tokio::test]
    async fn test_init_twice_leaves_project_alone() {
        let dir = tempfile::tempdir().unwrap();
        let args = InitArgs {
            no_import: true,
            no_hooks: true,
        };
        let project = init(dir.path(), args, None).await.unwrap();
        std::fs::write(project.rules_dir().join("01-project.md"), "custom").unwrap();

        init(dir.path(), args, None).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(project.rules_dir().join("01-project.md")).unwrap(),
            "custom"
        );
    }
}
