use std::time::Instant;

use anyhow::{Context, Result};
use tracing::warn;

use super::{file_summary, header, list, notice, open_project, success, table};
use crate::adapters::{self, ToolAdapter};
use crate::clipboard;
use crate::compiler::compile;
use crate::config::Project;
use crate::error::CtxError;
use crate::git::{GitClient, VcsProbe};
use crate::refresh::RefreshPipeline;
use crate::registry::Registry;
use crate::rules::{format_chars, RuleStore};
use crate::session::{LiveUpdate, Session, SessionDraft, SessionStore};

#[derive(Debug, Clone, Default)]
pub struct SaveArgs {
    pub message: String,
    pub tool: Option<String>,
    pub decisions: Vec<String>,
    pub next_steps: Vec<String>,
}

pub async fn save(args: SaveArgs) -> Result<()> {
    let project = open_project()?;
    let session = save_in(&project, &GitClient::new(), args).await?;

    success(format!("Session saved: {}", session.id));
    table(&[
        ("Branch", session.branch_or_default().to_string()),
        ("Task", session.task.clone()),
        ("Files changed", session.files_changed.len().to_string()),
        ("Diff", session.diff_summary.clone().unwrap_or_else(|| "none".into())),
    ]);
    Ok(())
}

async fn save_in<P: VcsProbe>(project: &Project, probe: &P, args: SaveArgs) -> Result<Session> {
    if args.message.trim().is_empty() {
        anyhow::bail!("Task description is required. Use: ctx save \"your message\"");
    }
    let defaults = project.config().await.session_defaults;
    let store = SessionStore::new(project.sessions_dir()).with_defaults(defaults);
    let draft = SessionDraft {
        task: args.message,
        tool: args.tool,
        decisions: args.decisions,
        next_steps: args.next_steps,
    };
    Ok(store.create(probe, &project.root, draft).await?)
}

#[derive(Debug, Clone, Default)]
pub struct ResumeArgs {
    pub tool: String,
    pub session: Option<String>,
    pub dry_run: bool,
    pub no_clipboard: bool,
}

/// Regenerate one tool's config from the latest (or a chosen) session and
/// hand over its resume prompt
pub async fn resume(args: ResumeArgs) -> Result<()> {
    let adapter = adapters::get(&args.tool)?;
    let project = open_project()?;
    let git = GitClient::new();
    let store = SessionStore::new(project.sessions_dir());

    let session = match &args.session {
        Some(id) => Some(
            store
                .get(id)
                .await?
                .ok_or_else(|| CtxError::SessionNotFound(id.clone()))?,
        ),
        None => store.latest(git.branch(&project.root).await.as_deref()).await?,
    };
    if session.is_none() {
        notice("No saved session found. Run `ctx save` first.");
        println!("  Generating config from rules only...");
    }

    let rules = RuleStore::new(project.rules_dir()).read().await?;
    let files = adapter.generate(&rules, session.as_ref(), &project.root);
    let profile = adapter.profile();

    if args.dry_run {
        header(format!("Dry run: would generate for {}", profile.display_name));
        for (path, content) in &files {
            println!("  {}", file_summary(path, content));
        }
        return Ok(());
    }

    adapters::write_files(&files)
        .await
        .with_context(|| format!("Failed to write {} config", profile.display_name))?;
    success(format!("Generated config for {}", profile.display_name));
    for path in files.keys() {
        println!("  {}", path.display());
    }

    if let Some(session) = &session {
        if !args.no_clipboard {
            let compiled = compile(Some(session), &[], profile.char_budget, profile.compress, profile.name);
            hand_over(adapter, &compiled.resume_prompt);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct SwitchArgs {
    pub tool: String,
    pub message: Option<String>,
    pub dry_run: bool,
}

/// Snapshot the current work, generate the target tool's config and copy
/// the resume prompt
pub async fn switch(args: SwitchArgs, registry: Option<&Registry>) -> Result<()> {
    let started = Instant::now();
    let adapter = adapters::get(&args.tool)?;
    let profile = adapter.profile();
    let project = open_project()?;
    let git = GitClient::new();

    let ctx = git.probe(&project.root).await;
    let task = args.message.clone().unwrap_or_else(|| {
        format!(
            "Continuing work on {}",
            ctx.branch.as_deref().unwrap_or(crate::session::DEFAULT_BRANCH)
        )
    });

    let defaults = project.config().await.session_defaults;
    let store = SessionStore::new(project.sessions_dir()).with_defaults(defaults);
    let session = store
        .create_from(
            SessionDraft {
                task: task.clone(),
                tool: Some(format!("switching-to-{}", profile.name)),
                ..Default::default()
            },
            ctx,
        )
        .await?;
    success(format!("Session saved: {}", session.id));

    let rules = RuleStore::new(project.rules_dir()).read().await?;
    let files = adapter.generate(&rules, Some(&session), &project.root);

    if args.dry_run {
        header(format!("Dry run: would generate for {}", profile.display_name));
        for (path, content) in &files {
            println!("  {}", file_summary(path, content));
        }
        return Ok(());
    }

    adapters::write_files(&files)
        .await
        .with_context(|| format!("Failed to write {} config", profile.display_name))?;
    success(format!("Generated {} config", profile.display_name));

    let compiled = compile(
        Some(&session),
        &rules,
        profile.char_budget,
        profile.compress,
        profile.name,
    );

    header(format!("Ready to switch to {}", profile.display_name));
    table(&[
        ("Session", session.id.clone()),
        ("Branch", session.branch_or_default().to_string()),
        (
            "Rules included",
            format!("{} ({})", compiled.rules_included, format_chars(compiled.total_chars)),
        ),
        ("Time", format!("{}ms", started.elapsed().as_millis())),
    ]);
    if compiled.over_budget {
        notice(format!(
            "Session alone exceeds the {} budget ({})",
            profile.display_name,
            format_chars(profile.char_budget)
        ));
    }
    hand_over(adapter, &compiled.resume_prompt);

    let pipeline = RefreshPipeline::new(project.clone(), git);
    let update = LiveUpdate {
        task: Some(task.clone()),
        ..Default::default()
    };
    if let Err(e) = pipeline.refresh(update).await {
        warn!("Could not refresh live session: {}", e);
    }
    if let Some(registry) = registry {
        if let Err(e) = registry
            .touch(&project.root, session.branch.clone(), Some(&task))
            .await
        {
            warn!("Could not update project registry: {}", e);
        }
    }
    Ok(())
}

/// Clipboard first, stdout when there is no clipboard
fn hand_over(adapter: &dyn ToolAdapter, prompt: &str) {
    let display = adapter.profile().display_name;
    match clipboard::copy(prompt) {
        Ok(()) => success(format!("Resume prompt copied to clipboard. Paste it into {}.", display)),
        Err(e) => {
            warn!("Clipboard unavailable: {}", e);
            notice("Could not copy to clipboard. Resume prompt:");
            println!("\n---\n{}\n---\n", prompt);
        }
    }
}

pub async fn session_list(branch: Option<String>) -> Result<()> {
    let project = open_project()?;
    let sessions = SessionStore::new(project.sessions_dir())
        .list(branch.as_deref())
        .await?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    match &branch {
        Some(b) => header(format!("Sessions (branch: {})", b)),
        None => header("Sessions"),
    }
    for s in &sessions {
        println!("  {} [{}] {}", s.id, s.branch_or_default(), s.task);
        println!(
            "    {} | {} files | {}",
            s.timestamp,
            s.files_changed.len(),
            s.tool.as_deref().unwrap_or("unknown tool")
        );
    }
    println!("\n  Total: {} session(s)", sessions.len());
    Ok(())
}

pub async fn session_show(id: &str) -> Result<()> {
    let project = open_project()?;
    let s = SessionStore::new(project.sessions_dir())
        .get(id)
        .await?
        .ok_or_else(|| CtxError::SessionNotFound(id.to_string()))?;

    header(format!("Session: {}", s.id));
    table(&[
        ("Task", s.task.clone()),
        ("Branch", s.branch_or_default().to_string()),
        ("Time", s.timestamp.clone()),
        ("Tool", s.tool.clone().unwrap_or_else(|| "unknown".into())),
        ("Head", s.head_hash.clone().unwrap_or_else(|| "n/a".into())),
        ("Diff", s.diff_summary.clone().unwrap_or_else(|| "none".into())),
    ]);
    for (title, items) in [
        ("Decisions", &s.decisions),
        ("Next Steps", &s.next_steps),
        ("Files Changed", &s.files_changed),
        ("Recent Commits", &s.recent_commits),
    ] {
        if !items.is_empty() {
            header(title);
            list(items);
        }
    }
    Ok(())
}

pub async fn session_delete(id: &str) -> Result<()> {
    let project = open_project()?;
    if !SessionStore::new(project.sessions_dir()).delete(id).await? {
        return Err(CtxError::SessionNotFound(id.to_string()).into());
    }
    success(format!("Deleted session: {}", id));
    Ok(())
}
