use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Maximum allowed nesting depth for OPML outline elements.
/// Deeply nested outlines are rejected rather than walked.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
///
/// All of these are fatal for a run: without the subscription list there is
/// nothing to archive.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// File I/O error.
    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses an OPML file from disk and extracts feed URLs.
///
/// # Errors
///
/// Returns [`OpmlError::Io`] if the file cannot be read and
/// [`OpmlError::XmlParse`] if it is not well-formed XML.
pub async fn parse(path: &Path) -> Result<Vec<String>, OpmlError> {
    tracing::info!(path = %path.display(), "Parsing OPML file");
    let content = tokio::fs::read_to_string(path).await?;
    extract_feed_urls(&content)
}

/// Parses OPML from an already-open stream such as stdin.
pub fn parse_reader<R: Read>(mut reader: R) -> Result<Vec<String>, OpmlError> {
    tracing::info!("Parsing OPML from stream");
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    extract_feed_urls(&content)
}

/// Extracts the `xmlUrl` of every RSS outline inside the OPML `<body>`.
///
/// Outlines are matched at any nesting depth, so both flat lists and
/// category folders work. An outline qualifies when its `type` attribute is
/// `rss` (ASCII case-insensitive) and it carries a non-empty `xmlUrl`.
/// Document order is preserved and duplicates are kept.
///
/// quick-xml never expands `<!ENTITY>` declarations; custom entity references
/// in attribute values fail to unescape and the outline is skipped.
pub fn extract_feed_urls(content: &str) -> Result<Vec<String>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut buf = Vec::new();
    // Open elements of any kind; must be zero again at EOF.
    let mut open_elements: usize = 0;
    let mut seen_root = false;
    let mut body_depth: Option<usize> = None;
    let mut outline_depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                open_elements += 1;
                seen_root = true;
                match e.name().as_ref() {
                    b"body" if body_depth.is_none() => body_depth = Some(open_elements),
                    b"outline" => {
                        outline_depth += 1;
                        if outline_depth > MAX_OPML_DEPTH {
                            return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                        }
                        if body_depth.is_some() {
                            if let Some(url) = rss_outline_url(&e, &reader) {
                                feeds.push(url);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                seen_root = true;
                if e.name().as_ref() == b"outline" && body_depth.is_some() {
                    if let Some(url) = rss_outline_url(&e, &reader) {
                        feeds.push(url);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"outline" {
                    outline_depth = outline_depth.saturating_sub(1);
                }
                if body_depth == Some(open_elements) {
                    body_depth = None;
                }
                open_elements = open_elements.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(OpmlError::XmlParse("no root element".to_string()));
    }
    if open_elements > 0 {
        return Err(OpmlError::XmlParse(format!(
            "unexpected end of document with {} unclosed element(s)",
            open_elements
        )));
    }

    tracing::info!(count = feeds.len(), "Found feeds in OPML");
    Ok(feeds)
}

/// Returns the feed URL of an RSS outline, `None` for anything else.
fn rss_outline_url(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Option<String> {
    let mut is_rss = false;
    let mut xml_url = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable OPML attribute");
                continue;
            }
        };
        match attr.key.as_ref() {
            b"type" => is_rss = value.eq_ignore_ascii_case("rss"),
            b"xmlUrl" => xml_url = Some(value.trim().to_string()),
            _ => {}
        }
    }

    xml_url.filter(|url| is_rss && !url.is_empty())
}
