//! The links tool: discover a page's internal links.
//!
//! Anchors are filtered to the page's own host, deduplicated, and ordered
//! by descending frequency then first appearance. The first anchor text
//! seen for each URL becomes its title.

use std::collections::HashMap;

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::error::FetchError;
use crate::web::WebClient;

/// Resolves and validates one `href` against the page URL.
///
/// Returns the absolute URL for internal links; `None` for fragments,
/// `javascript:` pseudo-links, cross-host links, and unparseable values.
fn parse_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    let resolved = if href.starts_with("http://") || href.starts_with("https://") {
        Url::parse(href).ok()?
    } else {
        base.join(href).ok()?
    };

    if resolved.host_str() != base.host_str()
        || resolved.port_or_known_default() != base.port_or_known_default()
    {
        return None;
    }

    Some(resolved.to_string())
}

/// Extracts internal links from `html`, paired with their first anchor
/// text, sorted by frequency and appearance order.
#[must_use]
pub fn parse_links(html: &str, base_url: &str) -> Vec<(String, String)> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("static selector is valid");

    let mut occurrences: Vec<String> = Vec::new();
    let mut first_title: HashMap<String, String> = HashMap::new();
    let mut unique_in_order: Vec<String> = Vec::new();

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(link) = parse_link(href, &base) else {
            continue;
        };

        occurrences.push(link.clone());

        first_title.entry(link.clone()).or_insert_with(|| {
            unique_in_order.push(link.clone());
            anchor.text().collect::<String>().trim().to_string()
        });
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for link in &occurrences {
        *counts.entry(link.as_str()).or_default() += 1;
    }

    // Stable sort keeps first-appearance order within equal frequencies.
    let mut links = unique_in_order;
    links.sort_by_key(|link| std::cmp::Reverse(counts.get(link.as_str()).copied().unwrap_or(0)));

    links
        .into_iter()
        .map(|link| {
            let title = first_title.remove(&link).unwrap_or_default();
            (link, title)
        })
        .collect()
}

/// Fetches `url` and lists its internal links.
///
/// # Errors
///
/// Propagates fetch failures, and returns `FetchError::NoLinks` when no
/// internal links can be extracted.
#[instrument(skip(client))]
pub async fn links(
    client: &WebClient,
    url: &str,
    max_links: usize,
    titles: bool,
) -> Result<String, FetchError> {
    let html = client.get_request(url).await?;
    let links = parse_links(&html, url);

    if links.is_empty() {
        return Err(FetchError::NoLinks {
            url: url.to_string(),
        });
    }

    let total = links.len();
    let shown = max_links.min(total);
    debug!(total, shown, "Extracted links");

    let header = if shown < total {
        format!("{shown} of the {total} links found on {url}\n")
    } else {
        format!("All {total} links found on {url}\n")
    };

    let mut lines = vec![header];
    for (link, title) in links.into_iter().take(max_links) {
        if titles {
            lines.push(format!("- {title}: {link}"));
        } else {
            lines.push(format!("- {link}"));
        }
    }

    Ok(lines.join("\n"))
}
