//! Web content tools: fetch with markdown extraction, and link discovery.
//!
//! These are pure data-transformation tools next to the sandbox core: one
//! HTTP GET, then string processing. Failures map onto a small taxonomy of
//! [`FetchError`] variants whose messages are what the LLM client reads.

mod fetch;
mod links;
mod search;

pub use fetch::{add_error, fetch};
pub use links::{links, parse_links};
pub use search::{SearchParams, search};

use std::time::Duration;

use crate::error::FetchError;

/// Overall deadline for one web request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client for the web tools.
#[derive(Debug, Clone)]
pub struct WebClient {
    client: reqwest::Client,
}

impl WebClient {
    /// Builds the client with the configured User-Agent.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Client` if the underlying client cannot be
    /// constructed.
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Client {
                detail: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Fetches `url` and returns the trimmed response body.
    ///
    /// # Errors
    ///
    /// Classifies transport failures (timeout, connect, redirect chain,
    /// other network errors), non-success statuses, and successful replies
    /// with an empty body.
    pub async fn get_request(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;
        let body = body.trim().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            });
        }

        if body.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(body)
    }
}

fn classify_transport_error(url: &str, error: &reqwest::Error) -> FetchError {
    let url = url.to_string();
    let detail = error.to_string();

    if error.is_timeout() {
        FetchError::Timeout { url, detail }
    } else if error.is_connect() {
        FetchError::Connect { url, detail }
    } else if error.is_redirect() {
        FetchError::TooManyRedirects { url, detail }
    } else {
        FetchError::Network { url, detail }
    }
}
