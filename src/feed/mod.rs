//! Feed discovery, retrieval and projection.
//!
//! - [`opml`] - Extract feed URLs from an OPML subscription list
//! - [`fetcher`] - HTTP retrieval and parsing via the `feed-rs` crate
//! - [`metadata`] - Project parsed feeds onto the archive record schemas
//!
//! # Example
//!
//! ```ignore
//! use podqueue::feed::{fetch_feed, parse, project_episode, project_feed};
//!
//! let urls = parse(Path::new("/path/to/subscriptions.opml")).await?;
//! for url in &urls {
//!     let feed = fetch_feed(&client, url).await?;
//!     let record = project_feed(&feed);
//!     let episodes: Vec<_> = feed.entries.iter().map(|e| project_episode(e, "%Y-%m-%d")).collect();
//! }
//! ```

mod fetcher;
mod metadata;
mod opml;

pub use fetcher::{fetch_feed, parse_feed, FetchError};
pub use metadata::{
    enclosures, format_timestamp, project_episode, project_feed, resolve_audio_link, Enclosure,
    EpisodeMetadata, FeedMetadata,
};
pub use opml::{extract_feed_urls, parse, parse_reader, OpmlError};
