use std::path::{Component, Path, PathBuf};

use crate::archive::download::{download, DownloadOutcome};
use crate::archive::ArchiveError;
use crate::feed::{EpisodeMetadata, FeedMetadata};
use crate::util::{fs::write_atomic, normalize, underscore_spaces};

/// Subdirectory of a feed directory holding episode records and audio.
pub const EPISODES_DIR: &str = "episodes";

/// Stand-in for the timestamp part of an episode key when the entry has no date.
pub const UNDATED: &str = "undated";

/// Stand-in for the title part of an episode key when the entry has no title.
pub const UNTITLED: &str = "untitled";

/// Joins a normalized relative name onto `base`, keeping only normal path
/// components. Root, `.` and `..` segments are dropped so the result always
/// stays beneath `base`. Returns `None` when nothing is left.
fn confined_join(base: &Path, name: &str) -> Option<PathBuf> {
    let mut path = base.to_path_buf();
    let mut pushed = false;
    for component in Path::new(name).components() {
        if let Component::Normal(part) = component {
            path.push(part);
            pushed = true;
        }
    }
    pushed.then_some(path)
}

/// Directory name derived from a feed title.
pub fn feed_dir_name(title: &str) -> String {
    normalize(&underscore_spaces(title)).into_owned()
}

/// Where one feed's files live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLayout {
    /// `<dest>/<feed-dir-name>`
    pub dir: PathBuf,
    /// `<dest>/<feed-dir-name>/episodes`
    pub episodes_dir: PathBuf,
    /// Final component of `dir`, used as the stem of the feed record and image.
    pub stem: String,
}

impl FeedLayout {
    /// Derives the layout for a feed title, or `None` when the title
    /// normalizes to nothing usable as a directory (e.g. `".."`).
    pub fn new(dest: &Path, feed_title: &str) -> Option<Self> {
        let dir = confined_join(dest, &feed_dir_name(feed_title))?;
        let stem = dir.file_name()?.to_string_lossy().into_owned();
        let episodes_dir = dir.join(EPISODES_DIR);
        Some(Self {
            dir,
            episodes_dir,
            stem,
        })
    }

    /// `<feed-dir>/<stem>.json`
    pub fn record_path(&self) -> PathBuf {
        self.dir.join(&*normalize(&format!("{}.json", self.stem)))
    }

    /// `<feed-dir>/<stem><ext>` where `<ext>` is the image URL's own suffix.
    pub fn image_path(&self, image_url: &str) -> PathBuf {
        let name = format!("{}{}", self.stem, url_extension(image_url));
        self.dir.join(&*normalize(&name))
    }

    pub async fn create_dirs(&self) -> Result<(), ArchiveError> {
        tokio::fs::create_dir_all(&self.episodes_dir)
            .await
            .map_err(|source| ArchiveError::io(&self.episodes_dir, source))
    }
}

/// The suffix of the URL's final `/` segment from its last `.` onward,
/// verbatim (query strings included). Empty when the segment has no dot
/// beyond a leading one.
pub fn url_extension(url: &str) -> &str {
    let segment = url.rsplit('/').next().unwrap_or(url);
    let body = segment.trim_start_matches('.');
    match body.rfind('.') {
        Some(i) => &body[i..],
        None => "",
    }
}

/// Durable on-disk identity of one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodePaths {
    /// `normalize(<published>_<title>)`
    pub key: String,
    pub meta_path: PathBuf,
    pub audio_path: PathBuf,
}

/// Derives the key and both file paths of an episode.
pub fn episode_paths(episodes_dir: &Path, episode: &EpisodeMetadata) -> EpisodePaths {
    let published = episode.published.as_deref().unwrap_or(UNDATED);
    let title = underscore_spaces(episode.title.as_deref().unwrap_or(UNTITLED));
    let key = normalize(&format!("{}_{}", published, title)).into_owned();

    let meta_path = confined_join(episodes_dir, &format!("{}.json", key))
        .unwrap_or_else(|| episodes_dir.join(format!("{}.json", UNTITLED)));
    let audio_path = confined_join(episodes_dir, &format!("{}.mp3", key))
        .unwrap_or_else(|| episodes_dir.join(format!("{}.mp3", UNTITLED)));

    EpisodePaths {
        key,
        meta_path,
        audio_path,
    }
}

/// Fetch-or-skip decision for one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePlan {
    /// Both the record and the audio exist; nothing to do.
    Skip,
    /// Either file is missing; rewrite the record and retry the audio.
    Fetch,
}

pub async fn plan_episode(paths: &EpisodePaths) -> EpisodePlan {
    let meta = tokio::fs::try_exists(&paths.meta_path).await.unwrap_or(false);
    let audio = tokio::fs::try_exists(&paths.audio_path).await.unwrap_or(false);
    if meta && audio {
        EpisodePlan::Skip
    } else {
        EpisodePlan::Fetch
    }
}

/// What happened to one episode during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeOutcome {
    /// Already archived; no I/O performed.
    Skipped,
    /// Record written and audio saved.
    Archived { bytes: u64 },
    /// Record written; the episode has no audio link.
    MetadataOnly,
    /// Record written; the audio download failed and will be retried next run.
    AudioFailed,
}

/// Applies the skip rule to one episode and performs whatever I/O it calls for.
///
/// # Errors
///
/// Returns [`ArchiveError`] only when the metadata record cannot be written.
/// Audio failures are logged and reported as [`EpisodeOutcome::AudioFailed`].
pub async fn archive_episode(
    client: &reqwest::Client,
    paths: &EpisodePaths,
    episode: &EpisodeMetadata,
) -> Result<EpisodeOutcome, ArchiveError> {
    if plan_episode(paths).await == EpisodePlan::Skip {
        tracing::info!(episode = %paths.key, "Episode already saved, skipping");
        return Ok(EpisodeOutcome::Skipped);
    }

    // Keys containing `/` land in a subdirectory of the episodes dir
    if let Some(parent) = paths.meta_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ArchiveError::io(parent, source))?;
    }

    write_json(&paths.meta_path, episode).await?;
    tracing::info!(episode = %paths.key, "Added episode metadata to disk");

    let Some(link) = episode.link.as_deref() else {
        tracing::warn!(episode = %paths.key, "Episode has no audio link");
        return Ok(EpisodeOutcome::MetadataOnly);
    };

    match download(client, link, &paths.audio_path).await {
        Ok(DownloadOutcome::Saved { bytes }) => {
            tracing::info!(episode = %paths.key, bytes = bytes, "Added episode audio to disk");
            Ok(EpisodeOutcome::Archived { bytes })
        }
        Ok(DownloadOutcome::NotFound { .. }) => Ok(EpisodeOutcome::AudioFailed),
        Err(e) => {
            tracing::warn!(episode = %paths.key, url = %link, error = %e, "Audio download failed");
            Ok(EpisodeOutcome::AudioFailed)
        }
    }
}

/// Overwrites the feed record with this run's metadata.
pub async fn write_feed_record(
    layout: &FeedLayout,
    metadata: &FeedMetadata,
) -> Result<PathBuf, ArchiveError> {
    let path = layout.record_path();
    write_json(&path, metadata).await?;
    Ok(path)
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    let json = serde_json::to_vec(value)?;
    write_atomic(path, &json)
        .await
        .map_err(|source| ArchiveError::io(path, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn episode(title: Option<&str>, published: Option<&str>, link: Option<&str>) -> EpisodeMetadata {
        EpisodeMetadata {
            title: title.map(str::to_string),
            link: link.map(str::to_string),
            description: None,
            published: published.map(str::to_string),
        }
    }

    #[test]
    fn test_feed_layout() {
        let layout = FeedLayout::new(Path::new("/dest"), "My Show").unwrap();
        assert_eq!(layout.dir, PathBuf::from("/dest/My_Show"));
        assert_eq!(layout.episodes_dir, PathBuf::from("/dest/My_Show/episodes"));
        assert_eq!(layout.record_path(), PathBuf::from("/dest/My_Show/My_Show.json"));
        assert_eq!(
            layout.image_path("https://cdn.example/art/cover.jpg"),
            PathBuf::from("/dest/My_Show/My_Show.jpg")
        );
    }

    #[test]
    fn test_feed_layout_slash_in_title_stays_under_dest() {
        let layout = FeedLayout::new(Path::new("/dest"), "AC/DC Live").unwrap();
        assert_eq!(layout.dir, PathBuf::from("/dest/AC/DC_Live"));
        assert_eq!(layout.stem, "DC_Live");
        assert_eq!(layout.record_path(), PathBuf::from("/dest/AC/DC_Live/DC_Live.json"));

        let layout = FeedLayout::new(Path::new("/dest"), "/etc/../passwd").unwrap();
        assert_eq!(layout.dir, PathBuf::from("/dest/etc/passwd"));
    }

    #[test]
    fn test_feed_layout_unusable_title() {
        assert!(FeedLayout::new(Path::new("/dest"), "..").is_none());
        assert!(FeedLayout::new(Path::new("/dest"), "").is_none());
        assert!(FeedLayout::new(Path::new("/dest"), "/").is_none());
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://x.example/a/cover.jpg"), ".jpg");
        assert_eq!(url_extension("https://x.example/a/cover.tar.gz"), ".gz");
        assert_eq!(url_extension("https://x.example/cover.png?v=2"), ".png?v=2");
        assert_eq!(url_extension("https://x.example/image"), "");
        assert_eq!(url_extension("https://x.example/.hidden"), "");
        assert_eq!(url_extension("https://x.example/"), "");
    }

    #[test]
    fn test_image_path_normalizes_query_suffix() {
        let layout = FeedLayout::new(Path::new("/dest"), "Show").unwrap();
        assert_eq!(
            layout.image_path("https://x.example/cover.png?v=2"),
            PathBuf::from("/dest/Show/Show.png_v_2")
        );
    }

    #[test]
    fn test_episode_paths() {
        let paths = episode_paths(
            Path::new("/dest/My_Show/episodes"),
            &episode(Some("Ep 1"), Some("2024-01-02"), None),
        );
        assert_eq!(paths.key, "2024-01-02_Ep_1");
        assert_eq!(
            paths.meta_path,
            PathBuf::from("/dest/My_Show/episodes/2024-01-02_Ep_1.json")
        );
        assert_eq!(
            paths.audio_path,
            PathBuf::from("/dest/My_Show/episodes/2024-01-02_Ep_1.mp3")
        );
    }

    #[test]
    fn test_episode_paths_fallbacks_and_special_chars() {
        let dir = Path::new("/e");
        assert_eq!(episode_paths(dir, &episode(Some("Ep 1"), None, None)).key, "undated_Ep_1");
        assert_eq!(episode_paths(dir, &episode(None, Some("2024-01-02"), None)).key, "2024-01-02_untitled");
        assert_eq!(
            episode_paths(dir, &episode(Some("What's new? #42"), Some("2024 01 02"), None)).key,
            "2024_01_02_What_s_new___42"
        );
    }

    #[tokio::test]
    async fn test_plan_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = episode_paths(dir.path(), &episode(Some("Ep"), Some("2024-01-02"), None));

        assert_eq!(plan_episode(&paths).await, EpisodePlan::Fetch);

        std::fs::write(&paths.meta_path, b"{}").unwrap();
        assert_eq!(plan_episode(&paths).await, EpisodePlan::Fetch);

        std::fs::write(&paths.audio_path, b"audio").unwrap();
        assert_eq!(plan_episode(&paths).await, EpisodePlan::Skip);

        std::fs::remove_file(&paths.meta_path).unwrap();
        assert_eq!(plan_episode(&paths).await, EpisodePlan::Fetch);
    }

    #[tokio::test]
    async fn test_archive_episode_skip_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .expect(0)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ep = episode(
            Some("Ep"),
            Some("2024-01-02"),
            Some(format!("{}/ep.mp3", mock_server.uri()).as_str()),
        );
        let paths = episode_paths(dir.path(), &ep);
        std::fs::write(&paths.meta_path, b"old meta").unwrap();
        std::fs::write(&paths.audio_path, b"old audio").unwrap();

        let client = reqwest::Client::new();
        let outcome = archive_episode(&client, &paths, &ep).await.unwrap();

        assert_eq!(outcome, EpisodeOutcome::Skipped);
        assert_eq!(std::fs::read(&paths.meta_path).unwrap(), b"old meta");
    }

    #[tokio::test]
    async fn test_archive_episode_rewrites_metadata_when_audio_missing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ep.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ep = episode(
            Some("Ep"),
            Some("2024-01-02"),
            Some(format!("{}/ep.mp3", mock_server.uri()).as_str()),
        );
        let paths = episode_paths(dir.path(), &ep);
        std::fs::write(&paths.meta_path, b"stale").unwrap();

        let client = reqwest::Client::new();
        let outcome = archive_episode(&client, &paths, &ep).await.unwrap();

        assert_eq!(outcome, EpisodeOutcome::Archived { bytes: 5 });
        let written: EpisodeMetadata =
            serde_json::from_slice(&std::fs::read(&paths.meta_path).unwrap()).unwrap();
        assert_eq!(written, ep);
        assert_eq!(std::fs::read(&paths.audio_path).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_archive_episode_without_link_writes_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let ep = episode(Some("Ep"), Some("2024-01-02"), None);
        let paths = episode_paths(dir.path(), &ep);

        let client = reqwest::Client::new();
        let outcome = archive_episode(&client, &paths, &ep).await.unwrap();

        assert_eq!(outcome, EpisodeOutcome::MetadataOnly);
        assert!(paths.meta_path.exists());
        assert!(!paths.audio_path.exists());
    }

    #[tokio::test]
    async fn test_archive_episode_audio_404_keeps_metadata() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ep = episode(
            Some("Ep"),
            Some("2024-01-02"),
            Some(format!("{}/gone.mp3", mock_server.uri()).as_str()),
        );
        let paths = episode_paths(dir.path(), &ep);

        let client = reqwest::Client::new();
        let outcome = archive_episode(&client, &paths, &ep).await.unwrap();

        assert_eq!(outcome, EpisodeOutcome::AudioFailed);
        assert!(paths.meta_path.exists());
        assert!(!paths.audio_path.exists());
    }

    #[tokio::test]
    async fn test_archive_episode_key_with_slash_creates_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let ep = episode(Some("AC/DC"), Some("2024-01-02"), None);
        let paths = episode_paths(dir.path(), &ep);
        assert_eq!(paths.meta_path, dir.path().join("2024-01-02_AC").join("DC.json"));

        let client = reqwest::Client::new();
        let outcome = archive_episode(&client, &paths, &ep).await.unwrap();
        assert_eq!(outcome, EpisodeOutcome::MetadataOnly);
        assert!(paths.meta_path.exists());
    }
}
