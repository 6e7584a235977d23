use anyhow::Result;

use super::{header, open_project, success};
use crate::git::GitClient;
use crate::hooks::HookInstaller;

async fn installer() -> Result<HookInstaller> {
    let project = open_project()?;
    Ok(HookInstaller::for_repo(&GitClient::new(), &project.root).await?)
}

pub async fn hooks_install() -> Result<()> {
    let installed = installer().await?.install().await?;
    if installed.is_empty() {
        println!("Git hooks already installed.");
    } else {
        success(format!("Installed git hooks: {}", installed.join(", ")));
        println!("  Context refreshes on commit, checkout and merge.");
    }
    Ok(())
}

pub async fn hooks_uninstall() -> Result<()> {
    let removed = installer().await?.uninstall().await?;
    if removed.is_empty() {
        println!("No ctx git hooks found.");
    } else {
        success(format!("Removed git hooks: {}", removed.join(", ")));
    }
    Ok(())
}

pub async fn hooks_status() -> Result<()> {
    let installer = installer().await?;
    let status = installer.status().await?;

    header(format!("Git Hooks ({})", installer.hooks_dir().display()));
    for (name, installed) in &status {
        if *installed {
            println!("  ✓ {} installed", name);
        } else {
            println!("    {} not installed", name);
        }
    }
    if status.iter().all(|(_, installed)| !installed) {
        println!("\n  Run `ctx hooks install` to refresh context on git events.");
    }
    Ok(())
}
