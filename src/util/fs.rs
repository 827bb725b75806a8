use std::path::{Path, PathBuf};

/// Suffix appended to a destination's file name while it is being written.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Builds the sibling temporary path for `dst`.
///
/// The name is fixed per destination, so whatever an interrupted run left
/// behind is truncated and reused by the next write to the same path.
pub fn temp_path_for(dst: &Path) -> PathBuf {
    let mut name = dst
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    dst.with_file_name(name)
}

/// Opens the temporary file for `dst`, discarding any stale content.
pub async fn create_temp(temp_path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .await
}

/// Atomically writes `content` to `dst` using write-to-temp-then-rename.
///
/// `dst` is either left untouched or fully replaced; a partially written
/// file never appears at the destination path.
pub async fn write_atomic(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let temp_path = temp_path_for(dst);

    let mut temp_file = create_temp(&temp_path).await?;

    let written = async {
        temp_file.write_all(content).await?;
        temp_file.sync_all().await
    }
    .await;

    drop(temp_file);

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    commit(&temp_path, dst).await
}

/// Renames a finished temp file over `dst`, removing the temp file on failure.
pub async fn commit(temp_path: &Path, dst: &Path) -> std::io::Result<()> {
    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if tokio::fs::try_exists(dst).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(dst).await {
            let _ = tokio::fs::remove_file(temp_path).await;
            return Err(e);
        }
    }

    if let Err(e) = tokio::fs::rename(temp_path, dst).await {
        let _ = tokio::fs::remove_file(temp_path).await;
        return Err(e);
    }

    Ok(())
}
