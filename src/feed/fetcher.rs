use feed_rs::model::Feed;
use futures::StreamExt;
use thiserror::Error;

/// Upper bound on a feed document body. Long-running podcasts carry
/// thousands of items, so this is generous.
const MAX_FEED_SIZE: usize = 50 * 1024 * 1024; // 50MB

/// Errors that can occur while fetching a single feed.
///
/// Every variant is scoped to one feed: the caller logs it, skips the feed,
/// and moves on to the next one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Feed document is not well-formed RSS/Atom
    #[error("Malformed feed: {0}")]
    Malformed(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// True when the failure came from the document itself rather than the
    /// transport.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FetchError::Malformed(_))
    }
}

/// Retrieves a feed over HTTP and parses it into a [`Feed`].
///
/// No retries are attempted; a failed feed is simply picked up again on the
/// next run.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Body exceeded the size limit
/// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
/// - [`FetchError::Malformed`] - Body is not parseable RSS/Atom
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Feed, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    parse_feed(&bytes)
}

/// Parses raw feed bytes, classifying any parser failure as malformed.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, FetchError> {
    feed_rs::parser::parse(bytes).map_err(|e| FetchError::Malformed(e.to_string()))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
