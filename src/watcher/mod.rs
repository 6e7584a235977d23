//! Keeps the live session current with two triggers: a fixed interval and
//! debounced filesystem changes. Both feed one channel drained by a single
//! loop, so refreshes inside one watcher never overlap.

mod marker;

pub use marker::{running_pid, stop, WatcherMarker};

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::CTX_DIR;
use crate::git::VcsProbe;
use crate::refresh::RefreshPipeline;
use crate::session::LiveUpdate;

pub const DEBOUNCE: Duration = Duration::from_secs(2);

/// Directories whose churn never warrants a refresh
const IGNORED_DIRS: &[&str] = &[
    CTX_DIR,
    ".git",
    "node_modules",
    "target",
    "vendor",
    ".venv",
    "__pycache__",
];

/// Events that can wake the watcher loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The refresh interval elapsed
    Interval,
    /// A relevant file under the project changed
    FileChanged(PathBuf),
    /// Stop the loop
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub refreshes: usize,
    pub failed: usize,
}

pub struct Watcher<P> {
    pipeline: RefreshPipeline<P>,
    interval: Duration,
    debounce: Duration,
    file_watch: bool,
}

impl<P: VcsProbe> Watcher<P> {
    pub fn new(pipeline: RefreshPipeline<P>, interval: Duration, file_watch: bool) -> Self {
        Self {
            pipeline,
            interval,
            debounce: DEBOUNCE,
            file_watch,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Run until `shutdown` resolves. Performs one refresh immediately; a
    /// shutdown arriving during it stops the loop once it completes.
    pub async fn run_until<F>(self, shutdown: F) -> WatcherStats
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Trigger>();
        let mut stats = WatcherStats::default();

        let root = std::fs::canonicalize(&self.pipeline.project().root)
            .unwrap_or_else(|_| self.pipeline.project().root.clone());

        info!("Watching {}", root.display());
        debug!(
            "Refresh interval {:?}, file change detection {}",
            self.interval,
            if self.file_watch { "on" } else { "off" }
        );

        // Listen for shutdown before the first refresh so a signal during it
        // still ends the loop normally and the marker gets released
        let stop_tx = tx.clone();
        let stopper = tokio::spawn(async move {
            shutdown.await;
            let _ = stop_tx.send(Trigger::Shutdown);
        });
        tokio::task::yield_now().await;

        self.refresh(&mut stats).await;

        // Spawn interval ticker
        let tick_tx = tx.clone();
        let interval = self.interval;
        let ticker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tick_tx.send(Trigger::Interval).is_err() {
                    break;
                }
            }
        });

        // Keep the fs watcher alive for the whole loop
        let _fs_watcher = if self.file_watch {
            spawn_fs_watcher(&root, tx.clone())
        } else {
            None
        };
        drop(tx);

        let mut deadline: Option<Instant> = None;
        loop {
            let pending = deadline;
            let debounce = async move {
                match pending {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                trigger = rx.recv() => match trigger {
                    Some(Trigger::Interval) => self.refresh(&mut stats).await,
                    Some(Trigger::FileChanged(path)) => {
                        debug!("File changed: {}", path.display());
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    Some(Trigger::Shutdown) | None => break,
                },
                _ = debounce => {
                    deadline = None;
                    self.refresh(&mut stats).await;
                }
            }
        }

        ticker.abort();
        stopper.abort();
        info!("Watcher stopped after {} refreshes", stats.refreshes);
        stats
    }

    async fn refresh(&self, stats: &mut WatcherStats) {
        match self.pipeline.refresh(LiveUpdate::default()).await {
            Ok(outcome) => {
                stats.refreshes += 1;
                debug!(
                    "[{}] Refreshed: {} files, {} resume prompts",
                    chrono::Local::now().format("%H:%M:%S"),
                    outcome.session.files_changed.len(),
                    outcome.resume_count
                );
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Refresh failed: {}", e);
            }
        }
    }
}

/// Start a recursive notify watcher that forwards relevant paths as triggers.
/// `None` when the platform offers no watcher; the interval trigger still runs.
fn spawn_fs_watcher(
    root: &Path,
    tx: mpsc::UnboundedSender<Trigger>,
) -> Option<notify::RecommendedWatcher> {
    let filter = ChangeFilter::new(root);
    let mut watcher = match notify::recommended_watcher(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if let Some(path) = event.paths.into_iter().find(|p| !filter.is_ignored(p)) {
                    let _ = tx.send(Trigger::FileChanged(path));
                }
            }
            Err(e) => debug!("watch event error: {}", e),
        },
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!("File watching not available ({}). Using timer only.", e);
            return None;
        }
    };

    if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
        warn!("Could not watch {} ({}). Using timer only.", root.display(), e);
        return None;
    }
    Some(watcher)
}

/// Decides which changed paths are worth a refresh
pub struct ChangeFilter {
    root: PathBuf,
    gitignore: Gitignore,
}

impl ChangeFilter {
    pub fn new(root: &Path) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        if let Some(e) = builder.add(root.join(".gitignore")) {
            debug!("No usable .gitignore: {}", e);
        }
        let gitignore = builder.build().unwrap_or_else(|e| {
            warn!("Ignoring malformed .gitignore: {}", e);
            Gitignore::empty()
        });
        Self {
            root: root.to_path_buf(),
            gitignore,
        }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        if relative.as_os_str().is_empty() {
            return true;
        }

        let in_ignored_dir = relative.components().any(|c| match c {
            Component::Normal(name) => IGNORED_DIRS.iter().any(|d| name == *d),
            _ => false,
        });
        if in_ignored_dir {
            return true;
        }

        self.gitignore
            .matched_path_or_any_parents(relative, path.is_dir())
            .is_ignore()
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
