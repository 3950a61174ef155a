//! The fetch tool: retrieve a URL and clean it up for an LLM reader.

use tracing::{debug, instrument};

use crate::error::FetchError;
use crate::web::WebClient;

/// Attaches an `<error>` note to tool output without discarding the content.
#[must_use]
pub fn add_error(text: &str, error: &str, append: bool) -> String {
    if append {
        format!("{text}\n\n<error>{error}</error>")
    } else {
        format!("<error>{error}</error>\n\n{text}")
    }
}

/// Fetches `url` and returns its content, converted to markdown unless
/// `raw` is set.
///
/// `max_length > 0` truncates the content to that many characters and
/// appends a truncation note. Markdown conversion failure falls back to raw
/// content with a note prepended; it never fails the call.
///
/// # Errors
///
/// Propagates the request-level [`FetchError`] taxonomy from
/// [`WebClient::get_request`].
#[instrument(skip(client))]
pub async fn fetch(
    client: &WebClient,
    url: &str,
    max_length: usize,
    raw: bool,
) -> Result<String, FetchError> {
    let downloaded = client.get_request(url).await?;
    debug!(bytes = downloaded.len(), "Fetched page");

    let mut content = if raw {
        downloaded
    } else {
        let markdown = html2md::parse_html(&downloaded);
        if markdown.trim().is_empty() {
            add_error(
                &downloaded,
                "Extraction to markdown failed; returning raw content",
                false,
            )
        } else {
            markdown
        }
    };

    if max_length > 0 && content.chars().count() > max_length {
        let truncated: String = content.chars().take(max_length).collect();
        content = add_error(
            &truncated,
            &format!("Content truncated. The output has been limited to {max_length} characters"),
            true,
        );
    }

    Ok(format!("Contents of {url}:\n\n{content}"))
}
