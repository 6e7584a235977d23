use std::time::Duration;

use anyhow::Result;
use tracing::info;

use super::{header, notice, open_project, success};
use crate::config::CTX_DIR;
use crate::git::GitClient;
use crate::refresh::RefreshPipeline;
use crate::session::LiveUpdate;
use crate::watcher::{self, Watcher, WatcherMarker};

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchArgs {
    /// Seconds between timer refreshes; config value when absent
    pub interval: Option<u64>,
    pub no_file_watch: bool,
}

/// Run the watcher in the foreground until Ctrl+C or SIGTERM
pub async fn watch(args: WatchArgs) -> Result<()> {
    let project = open_project()?;
    let config = project.config().await;
    let marker = WatcherMarker::acquire(&project.watcher_pid_path()).await?;

    let interval = Duration::from_secs(args.interval.unwrap_or(config.watcher.interval_secs).max(1));
    let file_watch = config.watcher.file_watch && !args.no_file_watch;

    header(format!("Starting context watcher (pid {})", marker.pid()));
    println!("  Refreshing every {}s{}", interval.as_secs(), if file_watch { " and on file changes" } else { "" });
    println!("  Resume prompts stay ready in {}/resume-prompts/<tool>.md", CTX_DIR);
    println!("  Press Ctrl+C to stop.");

    let pipeline = RefreshPipeline::new(project, GitClient::new());
    let stats = Watcher::new(pipeline, interval, file_watch)
        .run_until(watcher::shutdown_signal())
        .await;

    marker.release().await;
    info!("Watcher exited ({} refreshes, {} failed)", stats.refreshes, stats.failed);
    success(format!("Watcher stopped after {} refreshes", stats.refreshes));
    Ok(())
}

pub async fn watch_stop() -> Result<()> {
    let project = open_project()?;
    match watcher::stop(&project.watcher_pid_path()).await? {
        Some(pid) => success(format!("Sent stop signal to watcher (pid {})", pid)),
        None => notice("No watcher is running."),
    }
    Ok(())
}

/// One refresh; what the git hooks call
pub async fn refresh(task: Option<String>, quiet: bool) -> Result<()> {
    let project = open_project()?;
    let pipeline = RefreshPipeline::new(project, GitClient::new());
    let outcome = pipeline
        .refresh(LiveUpdate {
            task,
            ..Default::default()
        })
        .await?;

    if !quiet {
        success(format!(
            "Live session refreshed: {} ({} files changed)",
            outcome.session.task,
            outcome.session.files_changed.len()
        ));
        success(format!("{} resume prompts regenerated", outcome.resume_count));
        for (tool, reason) in &outcome.failures {
            notice(format!("{}: {}", tool, reason));
        }
    }
    Ok(())
}
