use std::path::Path;

use anyhow::Result;

use super::{header, success};
use crate::registry::{time_since, Registry, Storage};

pub async fn projects_list(registry: &Registry) -> Result<()> {
    let projects = registry.list().await;
    if projects.is_empty() {
        println!("No projects registered. Run `ctx init` in a project to register it.");
        return Ok(());
    }

    header(format!("Projects ({})", projects.len()));
    for p in &projects {
        let state = match (p.exists, p.has_live_session) {
            (false, _) => "(missing)",
            (true, true) => "(live)",
            (true, false) => "(idle)",
        };
        let branch = p
            .entry
            .branch
            .as_deref()
            .map(|b| format!(" [{}]", b))
            .unwrap_or_default();
        let storage = match p.entry.storage {
            Storage::Git => "git",
            Storage::Local => "local",
        };

        println!("  {}{} {}", p.entry.name, branch, state);
        match &p.entry.task {
            Some(task) => println!("    {} ({}): {}", p.entry.path.display(), storage, task),
            None => println!("    {} ({})", p.entry.path.display(), storage),
        }
        println!("    Last active: {}", time_since(&p.entry.last_active));
    }

    let live = projects.iter().filter(|p| p.has_live_session).count();
    if live > 0 {
        println!("\n  {} project(s) with live context ready.", live);
    }
    Ok(())
}

pub async fn projects_remove(registry: &Registry, path: &Path) -> Result<()> {
    if !registry.unregister(path).await? {
        anyhow::bail!("Project not found in registry: {}", path.display());
    }
    success(format!("Removed project: {}", path.display()));
    Ok(())
}
