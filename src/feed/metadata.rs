//! Projection of parsed feeds onto the fixed archive record schemas.
//!
//! `feed-rs` exposes a rich, format-agnostic model. The archive only keeps a
//! handful of fields per feed and per episode, each of which may be absent.

use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed, Link};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Feed-level record written to `<feed-dir>/<feed-dir-name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMetadata {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    /// URL of the cover image.
    pub image: Option<String>,
    pub categories: Vec<String>,
    /// Number of entries in the fetched document, not a feed-declared count.
    pub episode_count: usize,
}

/// Episode-level record written next to the episode audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub title: Option<String>,
    /// Resolved audio URL, or the entry's own link when no audio enclosure exists.
    pub link: Option<String>,
    pub description: Option<String>,
    /// Publication time rendered with the configured time format.
    pub published: Option<String>,
}

/// A typed media reference attached to an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Enclosure {
    pub href: String,
    pub media_type: Option<String>,
}

pub fn project_feed(feed: &Feed) -> FeedMetadata {
    FeedMetadata {
        title: feed.title.as_ref().map(|t| t.content.clone()),
        link: page_link(&feed.links)
            .or_else(|| feed.links.first())
            .map(|l| l.href.clone()),
        description: feed.description.as_ref().map(|t| t.content.clone()),
        published: feed.published.or(feed.updated).map(|dt| dt.to_rfc3339()),
        image: feed
            .logo
            .as_ref()
            .or(feed.icon.as_ref())
            .map(|image| image.uri.clone()),
        categories: feed.categories.iter().map(|c| c.term.clone()).collect(),
        episode_count: feed.entries.len(),
    }
}

/// Projects one feed entry.
///
/// `time_format` is a chrono strftime pattern. A pattern chrono cannot render
/// leaves `published` absent rather than failing the episode.
pub fn project_episode(entry: &Entry, time_format: &str) -> EpisodeMetadata {
    let enclosures = enclosures(entry);
    let link = resolve_audio_link(&enclosures)
        .map(str::to_string)
        .or_else(|| page_link(&entry.links).map(|l| l.href.clone()));

    let description = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()));

    EpisodeMetadata {
        title: entry.title.as_ref().map(|t| t.content.clone()),
        link,
        description,
        published: entry
            .published
            .or(entry.updated)
            .and_then(|dt| format_timestamp(&dt, time_format)),
    }
}

/// Collects an entry's typed links, then its media attachments (RSS
/// `<enclosure>` elements). Each group keeps its own document order.
pub fn enclosures(entry: &Entry) -> Vec<Enclosure> {
    let links = entry
        .links
        .iter()
        .filter(|l| l.media_type.is_some())
        .map(|l| Enclosure {
            href: l.href.clone(),
            media_type: l.media_type.clone(),
        });

    let media = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|c| {
            c.url.as_ref().map(|url| Enclosure {
                href: url.to_string(),
                media_type: c.content_type.as_ref().map(|mime| mime.to_string()),
            })
        });

    links.chain(media).collect()
}

/// Picks the href of the first enclosure whose type mentions `audio`.
pub fn resolve_audio_link(enclosures: &[Enclosure]) -> Option<&str> {
    enclosures
        .iter()
        .find(|e| e.media_type.as_deref().is_some_and(|t| t.contains("audio")))
        .map(|e| e.href.as_str())
}

pub fn format_timestamp(dt: &DateTime<Utc>, time_format: &str) -> Option<String> {
    let mut out = String::new();
    match write!(out, "{}", dt.format(time_format)) {
        Ok(()) => Some(out),
        Err(_) => {
            tracing::warn!(format = %time_format, "Time format could not be rendered");
            None
        }
    }
}

/// The untyped alternate (page) link. Enclosures never qualify.
fn page_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.media_type.is_none() && matches!(l.rel.as_deref(), None | Some("alternate")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parse_feed;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const PODCAST_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>My Show</title>
    <link>https://myshow.example/</link>
    <description>A show about things</description>
    <category>Technology</category>
    <category>News</category>
    <image>
      <url>https://myshow.example/cover.jpg</url>
      <title>My Show</title>
      <link>https://myshow.example/</link>
    </image>
    <item>
      <title>Ep 1</title>
      <link>https://myshow.example/ep1</link>
      <description>First episode</description>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <guid>ep1</guid>
      <enclosure url="https://cdn.example/ep1.mp3" type="audio/mpeg" length="1234"/>
    </item>
    <item>
      <title>Ep 2</title>
      <link>https://myshow.example/ep2</link>
      <guid>ep2</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM_WITH_ENCLOSURES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Cast</title>
  <id>urn:uuid:feed</id>
  <updated>2024-03-01T00:00:00Z</updated>
  <entry>
    <title>Atom Ep</title>
    <id>urn:uuid:ep</id>
    <updated>2024-03-01T12:30:00Z</updated>
    <link rel="alternate" href="https://atom.example/ep"/>
    <link rel="enclosure" type="image/png" href="https://atom.example/art.png"/>
    <link rel="enclosure" type="audio/mpeg" href="https://atom.example/ep.mp3"/>
  </entry>
</feed>"#;

    #[test]
    fn test_project_feed() {
        let feed = parse_feed(PODCAST_RSS.as_bytes()).unwrap();
        let meta = project_feed(&feed);

        assert_eq!(meta.title.as_deref(), Some("My Show"));
        assert_eq!(meta.link.as_deref(), Some("https://myshow.example/"));
        assert_eq!(meta.description.as_deref(), Some("A show about things"));
        assert_eq!(meta.image.as_deref(), Some("https://myshow.example/cover.jpg"));
        assert_eq!(meta.categories, vec!["Technology", "News"]);
        assert_eq!(meta.episode_count, 2);
    }

    #[test]
    fn test_project_episode_with_audio_enclosure() {
        let feed = parse_feed(PODCAST_RSS.as_bytes()).unwrap();
        let ep = project_episode(&feed.entries[0], "%Y-%m-%d");

        assert_eq!(
            ep,
            EpisodeMetadata {
                title: Some("Ep 1".to_string()),
                link: Some("https://cdn.example/ep1.mp3".to_string()),
                description: Some("First episode".to_string()),
                published: Some("2024-01-02".to_string()),
            }
        );
    }

    #[test]
    fn test_project_episode_without_enclosure_keeps_entry_link() {
        let feed = parse_feed(PODCAST_RSS.as_bytes()).unwrap();
        let ep = project_episode(&feed.entries[1], "%Y-%m-%d");

        assert_eq!(ep.link.as_deref(), Some("https://myshow.example/ep2"));
        assert_eq!(ep.published, None);
        assert_eq!(ep.description, None);
    }

    #[test]
    fn test_atom_enclosure_links_resolve_first_audio() {
        let feed = parse_feed(ATOM_WITH_ENCLOSURES.as_bytes()).unwrap();
        let entry = &feed.entries[0];

        let found = enclosures(entry);
        assert_eq!(found.len(), 2);
        assert_eq!(resolve_audio_link(&found), Some("https://atom.example/ep.mp3"));

        // Falls back to updated when published is absent
        let ep = project_episode(entry, "%Y-%m-%d %H:%M");
        assert_eq!(ep.link.as_deref(), Some("https://atom.example/ep.mp3"));
        assert_eq!(ep.published.as_deref(), Some("2024-03-01 12:30"));
    }

    #[test]
    fn test_non_audio_enclosure_is_not_the_episode_link() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Video Cast</title>
  <id>urn:uuid:video</id>
  <updated>2024-03-01T00:00:00Z</updated>
  <entry>
    <title>Clip</title>
    <id>urn:uuid:clip</id>
    <updated>2024-03-01T12:30:00Z</updated>
    <link rel="enclosure" type="video/mp4" href="https://a.example/clip.mp4"/>
  </entry>
</feed>"#;
        let feed = parse_feed(atom.as_bytes()).unwrap();
        let ep = project_episode(&feed.entries[0], "%Y-%m-%d");

        assert_eq!(enclosures(&feed.entries[0]).len(), 1);
        assert_eq!(ep.link, None);
    }

    #[test]
    fn test_resolve_audio_link_skips_non_audio() {
        let enclosures = vec![
            Enclosure {
                href: "https://x.example/cover.png".to_string(),
                media_type: Some("image/png".to_string()),
            },
            Enclosure {
                href: "X".to_string(),
                media_type: Some("audio/mpeg".to_string()),
            },
            Enclosure {
                href: "Y".to_string(),
                media_type: Some("audio/ogg".to_string()),
            },
        ];
        assert_eq!(resolve_audio_link(&enclosures), Some("X"));
    }

    #[test]
    fn test_resolve_audio_link_none() {
        let enclosures = vec![
            Enclosure {
                href: "https://x.example/video.mp4".to_string(),
                media_type: Some("video/mp4".to_string()),
            },
            Enclosure {
                href: "https://x.example/untyped".to_string(),
                media_type: None,
            },
        ];
        assert_eq!(resolve_audio_link(&enclosures), None);
        assert_eq!(resolve_audio_link(&[]), None);
    }

    #[test]
    fn test_format_timestamp() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(&dt, "%Y-%m-%d").as_deref(), Some("2024-01-02"));
        assert_eq!(format_timestamp(&dt, "%Y%m%d-%H%M").as_deref(), Some("20240102-0304"));
        assert_eq!(format_timestamp(&dt, "%Q"), None);
    }

    #[test]
    fn test_feed_record_json_keys() {
        let meta = FeedMetadata {
            title: Some("My Show".to_string()),
            link: None,
            description: None,
            published: None,
            image: None,
            categories: Vec::new(),
            episode_count: 1,
        };
        let json: serde_json::Value = serde_json::to_value(&meta).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        let mut expected = vec![
            "categories",
            "description",
            "episode_count",
            "image",
            "link",
            "published",
            "title",
        ];
        expected.sort();
        assert_eq!(keys, expected);
        assert!(json["link"].is_null());
    }
}
