use futures::StreamExt;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::util::fs::{commit, create_temp, temp_path_for};

/// Write buffer size; the body is flushed to disk in chunks of this size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Result of a download that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The body was written to the destination.
    Saved { bytes: u64 },
    /// The server answered with a non-2xx status; nothing was written.
    NotFound { status: u16 },
}

/// Failures that interrupt a download after it started.
///
/// The destination is never left partially written: the body goes to a
/// temporary sibling file which is removed on any error.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error, either before the response or mid-body
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Local filesystem error while writing the body
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Downloads `url` to `dest`, replacing any existing file.
///
/// On a non-success status a warning is logged and [`DownloadOutcome::NotFound`]
/// is returned without touching `dest`.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<DownloadOutcome, DownloadError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(url = %url, status = status.as_u16(), "Asset could not be found");
        return Ok(DownloadOutcome::NotFound {
            status: status.as_u16(),
        });
    }

    let temp_path = temp_path_for(dest);
    let io_err = |source: std::io::Error| DownloadError::Io {
        path: dest.display().to_string(),
        source,
    };

    let file = create_temp(&temp_path).await.map_err(io_err)?;
    let mut writer = tokio::io::BufWriter::with_capacity(CHUNK_SIZE, file);

    let streamed: Result<u64, DownloadError> = async {
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(io_err)?;
        writer.get_ref().sync_all().await.map_err(io_err)?;
        Ok(written)
    }
    .await;

    drop(writer);

    let bytes = match streamed {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
    };

    commit(&temp_path, dest).await.map_err(io_err)?;

    tracing::debug!(url = %url, path = %dest.display(), bytes = bytes, "Saved asset");
    Ok(DownloadOutcome::Saved { bytes })
}
