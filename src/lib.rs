//! Incremental podcast archiver.
//!
//! Reads an OPML subscription list, fetches every RSS feed it names, and
//! mirrors each feed into a directory of JSON records and audio files.
//! Episodes already on disk are skipped, so repeated runs only download
//! what is new or previously failed.

pub mod archive;
pub mod config;
pub mod feed;
pub mod util;
