//! Incremental archival of feeds onto the local filesystem.
//!
//! - [`planner`] - Path derivation and the fetch-or-skip rule for episodes
//! - [`download`] - Streaming asset downloads (cover images, episode audio)
//!
//! [`run_archive`] drives both for every feed URL, strictly one feed and one
//! episode at a time. The filesystem is the only state: an episode whose
//! record and audio both exist is never touched again.

pub mod download;
pub mod planner;

use std::path::Path;
use thiserror::Error;

use crate::config::RunConfig;
use crate::feed::{fetch_feed, project_episode, project_feed, FetchError};
use download::{download, DownloadOutcome};
use planner::{archive_episode, episode_paths, write_feed_record, EpisodeOutcome, FeedLayout};

/// Errors writing archive records to disk.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Why a feed produced no archive output.
#[derive(Debug, Error)]
pub enum FeedSkip {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Feed has no usable title")]
    Untitled,

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Per-run counters, logged when the run finishes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub feeds_archived: usize,
    pub feeds_skipped: usize,
    pub episodes_archived: usize,
    pub episodes_skipped: usize,
    /// Episodes whose record was written without audio (no link, or failed download).
    pub episodes_incomplete: usize,
    /// Episodes whose record could not be written.
    pub episodes_failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: EpisodeOutcome) {
        match outcome {
            EpisodeOutcome::Skipped => self.episodes_skipped += 1,
            EpisodeOutcome::Archived { .. } => self.episodes_archived += 1,
            EpisodeOutcome::MetadataOnly | EpisodeOutcome::AudioFailed => {
                self.episodes_incomplete += 1
            }
        }
    }
}

/// Archives every feed in order.
///
/// Failures at feed granularity or below are logged and counted; they never
/// stop the run.
pub async fn run_archive(
    client: &reqwest::Client,
    config: &RunConfig,
    feeds: &[String],
) -> RunSummary {
    tracing::info!(count = feeds.len(), "Fetching feeds");

    let mut summary = RunSummary::default();
    for url in feeds {
        match archive_feed(client, config, url, &mut summary).await {
            Ok(()) => summary.feeds_archived += 1,
            Err(FeedSkip::Fetch(e)) if e.is_malformed() => {
                tracing::warn!(feed = %url, error = %e, "Feed is misformatted, skipping");
                summary.feeds_skipped += 1;
            }
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Skipping feed");
                summary.feeds_skipped += 1;
            }
        }
    }

    tracing::info!(
        feeds_archived = summary.feeds_archived,
        feeds_skipped = summary.feeds_skipped,
        episodes_archived = summary.episodes_archived,
        episodes_skipped = summary.episodes_skipped,
        episodes_incomplete = summary.episodes_incomplete,
        episodes_failed = summary.episodes_failed,
        "Run complete"
    );
    summary
}

/// Archives a single feed: record, cover image, then each episode.
///
/// Nothing is written unless the feed was fetched and parsed successfully.
pub async fn archive_feed(
    client: &reqwest::Client,
    config: &RunConfig,
    url: &str,
    summary: &mut RunSummary,
) -> Result<(), FeedSkip> {
    let feed = fetch_feed(client, url).await?;
    let metadata = project_feed(&feed);

    let layout = metadata
        .title
        .as_deref()
        .and_then(|title| FeedLayout::new(&config.dest, title))
        .ok_or(FeedSkip::Untitled)?;

    tracing::info!(
        feed = %url,
        title = metadata.title.as_deref().unwrap_or_default(),
        episodes = metadata.episode_count,
        "Processing feed"
    );

    layout.create_dirs().await?;
    let record = write_feed_record(&layout, &metadata).await?;
    tracing::debug!(path = %record.display(), "Wrote feed metadata");

    if let Some(image_url) = metadata.image.as_deref() {
        let image_path = layout.image_path(image_url);
        match download(client, image_url, &image_path).await {
            Ok(DownloadOutcome::Saved { .. }) => {
                tracing::info!(path = %image_path.display(), "Added image to disk");
            }
            Ok(DownloadOutcome::NotFound { .. }) => {}
            Err(e) => tracing::warn!(url = %image_url, error = %e, "Image download failed"),
        }
    }

    for entry in &feed.entries {
        let episode = project_episode(entry, &config.time_format);
        let paths = episode_paths(&layout.episodes_dir, &episode);
        match archive_episode(client, &paths, &episode).await {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                tracing::warn!(episode = %paths.key, error = %e, "Failed to archive episode");
                summary.episodes_failed += 1;
            }
        }
    }

    Ok(())
}
