use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// Replace `path` wholesale: write a sibling temp file, then rename over the target.
/// Readers see either the old content or the new content, never a partial write.
pub async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Pretty JSON with a trailing newline, written atomically
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> crate::error::Result<()> {
    let mut raw = serde_json::to_string_pretty(value)?;
    raw.push('\n');
    write_atomic(path, &raw).await?;
    Ok(())
}

/// Create `path` with `contents`. Fails with `AlreadyExists` rather than
/// replacing a file that is already there.
pub async fn write_new(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Read a file, mapping "does not exist" to `None`
pub async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
