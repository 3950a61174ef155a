//! The search tool: query a SearXNG instance.

use url::Url;

use crate::error::ConfigError;
use crate::web::WebClient;

/// Result formats the SearXNG API accepts.
const ALLOWED_FORMATS: &[&str] = &["json", "csv", "rss"];

/// Optional SearXNG query parameters, applied in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub categories: Option<String>,
    pub engines: Option<String>,
    pub language: Option<String>,
    pub pageno: Option<u32>,
    pub time_range: Option<String>,
    pub format: Option<String>,
    pub safesearch: Option<u8>,
}

/// Builds the full query URL for a search.
///
/// # Errors
///
/// Returns `ConfigError::InvalidSearchFormat` for an unknown format and
/// `ConfigError::SearchUnconfigured` if the endpoint does not parse.
fn build_query_url(
    base: &str,
    q: &str,
    params: &SearchParams,
) -> Result<Url, ConfigError> {
    let format = params.format.as_deref().unwrap_or("json");
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(ConfigError::InvalidSearchFormat {
            given: format.to_string(),
        });
    }

    let mut url = Url::parse(base).map_err(|_| ConfigError::SearchUnconfigured)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", q);
        pairs.append_pair("format", format);

        if let Some(categories) = &params.categories {
            pairs.append_pair("categories", categories);
        }
        if let Some(engines) = &params.engines {
            pairs.append_pair("engines", engines);
        }
        if let Some(language) = &params.language {
            pairs.append_pair("language", language);
        }
        if let Some(pageno) = params.pageno {
            pairs.append_pair("pageno", &pageno.to_string());
        }
        if let Some(time_range) = &params.time_range {
            pairs.append_pair("time_range", time_range);
        }
        if let Some(safesearch) = params.safesearch {
            pairs.append_pair("safesearch", &safesearch.to_string());
        }
    }

    Ok(url)
}

/// Queries the configured SearXNG instance.
///
/// # Errors
///
/// Returns `ConfigError::SearchUnconfigured` when no endpoint is set,
/// `ConfigError::InvalidSearchFormat` for a bad format, and the usual
/// [`FetchError`] taxonomy for request failures.
pub async fn search(
    client: &WebClient,
    endpoint: Option<&str>,
    q: &str,
    params: &SearchParams,
) -> Result<String, crate::error::Error> {
    let endpoint = endpoint.ok_or(ConfigError::SearchUnconfigured)?;
    let url = build_query_url(endpoint, q, params)?;
    Ok(client.get_request(url.as_str()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://searxng.local/search";

    #[test]
    fn test_query_defaults_to_json() {
        let url = build_query_url(BASE, "rust mcp", &SearchParams::default()).expect("valid");
        assert!(url.as_str().contains("q=rust+mcp"));
        assert!(url.as_str().contains("format=json"));
    }

    #[test]
    fn test_query_includes_optional_params() {
        let params = SearchParams {
            language: Some("en".to_string()),
            pageno: Some(2),
            safesearch: Some(1),
            ..SearchParams::default()
        };

        let url = build_query_url(BASE, "query", &params).expect("valid");
        let query = url.query().expect("query string");
        assert!(query.contains("language=en"));
        assert!(query.contains("pageno=2"));
        assert!(query.contains("safesearch=1"));
        assert!(!query.contains("time_range"));
    }

    #[test]
    fn test_query_rejects_unknown_format() {
        let params = SearchParams {
            format: Some("xml".to_string()),
            ..SearchParams::default()
        };

        let result = build_query_url(BASE, "query", &params);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSearchFormat { .. })
        ));
    }
}
