use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CtxError, Result};
use crate::fsutil;

/// Advisory single-watcher lock: a file holding the watcher's pid.
/// Only valid while that process is alive.
#[derive(Debug)]
pub struct WatcherMarker {
    path: PathBuf,
    pid: u32,
}

impl WatcherMarker {
    /// Claim the marker for this process, refusing if a live watcher holds it
    pub async fn acquire(path: &Path) -> Result<Self> {
        if let Some(pid) = running_pid(path).await {
            return Err(CtxError::WatcherAlreadyRunning { pid });
        }

        let pid = std::process::id();
        fsutil::write_atomic(path, &pid.to_string()).await?;
        debug!("Wrote watcher marker {} (pid {})", path.display(), pid);

        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the marker if it is still ours
    pub async fn release(self) {
        match fsutil::read_optional(&self.path).await {
            Ok(Some(raw)) if raw.trim().parse::<u32>().ok() == Some(self.pid) => {
                if let Err(e) = tokio::fs::remove_file(&self.path).await {
                    warn!("Could not remove watcher marker: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Could not read watcher marker: {}", e),
        }
    }
}

/// Pid of the live watcher recorded at `path`, if any
pub async fn running_pid(path: &Path) -> Option<u32> {
    let raw = fsutil::read_optional(path).await.ok()??;
    let pid = raw.trim().parse::<u32>().ok()?;
    process_alive(pid).then_some(pid)
}

/// Ask a running watcher to stop. Returns the signalled pid.
pub async fn stop(path: &Path) -> Result<Option<u32>> {
    let Some(pid) = running_pid(path).await else {
        // Stale or absent: clear it so the next start is not confused
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        return Ok(None);
    };
    terminate(pid)?;
    Ok(Some(pid))
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 only checks existence and permission
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    // No cheap liveness probe: trust the marker
    pid != 0
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    if unsafe { libc::kill(pid, libc::SIGTERM) } == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEAD_PID: u32 = 2_000_000_000;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");

        let marker = WatcherMarker::acquire(&path).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            std::process::id().to_string()
        );
        assert_eq!(running_pid(&path).await, Some(marker.pid()));

        marker.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");

        let first = WatcherMarker::acquire(&path).await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = WatcherMarker::acquire(&path).await.unwrap_err();
        assert!(matches!(err, CtxError::WatcherAlreadyRunning { pid } if pid == first.pid()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_marker_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");
        std::fs::write(&path, DEAD_PID.to_string()).unwrap();

        assert_eq!(running_pid(&path).await, None);
        let marker = WatcherMarker::acquire(&path).await.unwrap();
        assert_eq!(marker.pid(), std::process::id());
    }

    #[tokio::test]
    async fn test_garbage_marker_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");
        std::fs::write(&path, "not a pid").unwrap();
        assert_eq!(running_pid(&path).await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_clears_stale_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watcher.pid");
        std::fs::write(&path, DEAD_PID.to_string()).unwrap();

        assert_eq!(stop(&path).await.unwrap(), None);
        assert!(!path.exists());
    }
}
