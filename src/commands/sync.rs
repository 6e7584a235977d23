use std::path::Path;

use anyhow::Result;
use tracing::warn;

use super::{header, notice, open_project, success, table};
use crate::adapters::{self, ToolAdapter};
use crate::git::GitClient;
use crate::rules::{format_chars, RuleDocument, RuleStore};
use crate::session::{LiveSessionStore, Session, SessionStore};
use crate::watcher;

#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    /// Overrides the enabled tools from config
    pub tools: Vec<String>,
    pub with_session: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// (tool, files, chars) per synced tool
    pub synced: Vec<(&'static str, usize, usize)>,
    /// (tool, reason) per tool that failed or is unknown
    pub failures: Vec<(String, String)>,
}

impl SyncReport {
    pub fn files(&self) -> usize {
        self.synced.iter().map(|(_, files, _)| files).sum()
    }
}

/// Generate and write every named tool's config. One tool failing is
/// recorded and does not stop the rest.
pub async fn sync_tools(
    tools: &[String],
    rules: &[RuleDocument],
    session: Option<&Session>,
    project_root: &Path,
    dry_run: bool,
) -> SyncReport {
    let mut report = SyncReport::default();

    for name in tools {
        let adapter: &dyn ToolAdapter = match adapters::get(name) {
            Ok(adapter) => adapter,
            Err(e) => {
                report.failures.push((name.clone(), e.to_string()));
                continue;
            }
        };
        let profile = adapter.profile();
        let files = adapter.generate(rules, session, project_root);
        let chars = adapters::total_chars(&files);

        if dry_run {
            println!("  {}: {} file(s), {}", profile.display_name, files.len(), format_chars(chars));
            for path in files.keys() {
                println!("    {}", path.display());
            }
        } else if let Err(e) = adapters::write_files(&files).await {
            warn!("Failed to sync {}: {}", profile.display_name, e);
            report.failures.push((profile.name.to_string(), e.to_string()));
            continue;
        } else {
            success(format!(
                "{}: {} file(s) written ({})",
                profile.display_name,
                files.len(),
                format_chars(chars)
            ));
        }
        report.synced.push((profile.name, files.len(), chars));
    }

    report
}

pub async fn sync(args: SyncArgs) -> Result<()> {
    let project = open_project()?;
    let config = project.config().await;
    let rules = RuleStore::new(project.rules_dir()).read().await?;

    let session = if args.with_session {
        let branch = GitClient::new().branch(&project.root).await;
        SessionStore::new(project.sessions_dir())
            .latest(branch.as_deref())
            .await?
    } else {
        None
    };

    let tools = if args.tools.is_empty() {
        config.enabled_tools
    } else {
        args.tools
    };
    if tools.is_empty() {
        notice("No tools to sync. Check enabledTools in .ctx/config.json.");
        return Ok(());
    }

    header(format!("Syncing rules to {} tool(s)", tools.len()));
    if rules.is_empty() {
        notice("No rules found in .ctx/rules/. Add some with `ctx rules add`.");
    }

    let report = sync_tools(&tools, &rules, session.as_ref(), &project.root, args.dry_run).await;
    for (tool, reason) in &report.failures {
        eprintln!("✗ {}: {}", tool, reason);
    }

    if args.dry_run {
        println!("\nDry run complete. {} file(s) would be written.", report.files());
    } else {
        success(format!(
            "Synced {} file(s) across {} tool(s).",
            report.files(),
            report.synced.len()
        ));
    }
    Ok(())
}

pub async fn status() -> Result<()> {
    let project = open_project()?;
    let config = project.config().await;
    let git = GitClient::new();

    let git_line = if git.is_repo(&project.root).await {
        format!(
            "{} ({})",
            git.branch(&project.root).await.as_deref().unwrap_or("unknown"),
            git.head_hash(&project.root).await.as_deref().unwrap_or("no commits")
        )
    } else {
        "not a git repo".to_string()
    };
    let watcher_line = match watcher::running_pid(&project.watcher_pid_path()).await {
        Some(pid) => format!("running (pid {})", pid),
        None => "stopped".to_string(),
    };

    header("Project Status");
    table(&[
        ("Git", git_line),
        ("Default tool", config.default_tool.clone().unwrap_or_else(|| "none".into())),
        ("Enabled tools", config.enabled_tools.join(", ")),
        ("Auto-save", on_off(config.auto_save)),
        ("Auto-detect", on_off(config.auto_detect)),
        ("Watcher", watcher_line),
    ]);

    let rules = RuleStore::new(project.rules_dir()).read().await?;
    header("Rules");
    if rules.is_empty() {
        println!("  No rules defined. Run `ctx rules add` to create one.");
    } else {
        for rule in &rules {
            println!("  {} {} ({})", rule.priority_label(), rule.name, format_chars(rule.chars));
        }
        let total: usize = rules.iter().map(|r| r.chars).sum();
        println!("  Total: {}", format_chars(total));
    }

    let store = SessionStore::new(project.sessions_dir());
    let branch = git.branch(&project.root).await;
    header("Sessions");
    match store.latest(branch.as_deref()).await? {
        Some(latest) => {
            table(&[
                ("Latest", latest.id.clone()),
                ("Task", latest.task.clone()),
                ("Time", latest.timestamp.clone()),
                ("Branch", latest.branch_or_default().to_string()),
                ("Tool", latest.tool.clone().unwrap_or_else(|| "unknown".into())),
                ("Files changed", latest.files_changed.len().to_string()),
            ]);
            println!("  Total sessions: {}", store.list(None).await?.len());
        }
        None => println!("  No sessions saved. Run `ctx save` to create one."),
    }

    let live_store = LiveSessionStore::new(&project.sessions_dir());
    if let Some(live) = live_store.read().await {
        header("Live Session");
        table(&[
            ("File", live_store.path().display().to_string()),
            ("Task", live.task.clone()),
            ("Updated", live.timestamp.clone()),
            ("Files changed", live.files_changed.len().to_string()),
        ]);
    }
    Ok(())
}

fn on_off(flag: bool) -> String {
    if flag { "on" } else { "off" }.to_string()
}
