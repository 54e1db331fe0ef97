//! `reqwest`-backed feed connection.

use super::FeedConnection;
use super::parse::parse_feed;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{Error, FetchError, Result};
use crate::types::{FetchProperties, FetchResponse, Validators};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{
    ETAG, HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, WWW_AUTHENTICATE,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetches feeds over HTTP(S) with conditional GET and basic authentication
pub struct HttpFeedConnection {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

impl HttpFeedConnection {
    /// Create a connection using the configured user agent and timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: &Config, credentials: Arc<CredentialStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.reload.connection_timeout)
            .user_agent(config.reload.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
        })
    }

    async fn get(
        &self,
        url: &str,
        token: &CancellationToken,
        properties: &FetchProperties,
    ) -> std::result::Result<reqwest::Response, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::Connection {
            message: format!("Invalid feed URL '{}': {}", url, e),
            link: None,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnknownProtocol {
                scheme: parsed.scheme().to_string(),
            });
        }

        let mut request = self.client.get(parsed).timeout(properties.timeout);
        if let Some(record) = &properties.conditional_get {
            if let Some(since) = &record.if_modified_since {
                request = request.header(IF_MODIFIED_SINCE, since);
            }
            if let Some(etag) = &record.if_none_match {
                request = request.header(IF_NONE_MATCH, etag);
            }
        }
        if let Some(credentials) = self.credentials.get(url) {
            request = request.basic_auth(credentials.username, Some(credentials.password));
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(FetchError::Cancelled),
            response = request.send() => response.map_err(|e| FetchError::Connection {
                message: describe_transport_error(&e),
                link: Some(url.to_string()),
            }),
        }
    }
}

#[async_trait]
impl FeedConnection for HttpFeedConnection {
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
        properties: FetchProperties,
    ) -> std::result::Result<FetchResponse, FetchError> {
        tracing::debug!(url, timeout_secs = properties.timeout.as_secs(), "Fetching feed");

        let response = self.get(url, token, &properties).await?;
        let status = response.status();
        let resolved_url = response.url().to_string();

        match status {
            StatusCode::NOT_MODIFIED => return Err(FetchError::NotModified),
            StatusCode::UNAUTHORIZED => {
                return Err(FetchError::AuthRequired {
                    realm: realm(response.headers()),
                });
            }
            status if !status.is_success() => {
                return Err(FetchError::Connection {
                    message: format!("Feed returned HTTP {}", status.as_u16()),
                    link: Some(resolved_url),
                });
            }
            _ => {}
        }

        let validators = Validators {
            last_modified: header_string(response.headers(), LAST_MODIFIED),
            etag: header_string(response.headers(), ETAG),
        };

        let body = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            body = response.bytes() => body.map_err(|e| FetchError::Connection {
                message: format!("Failed to read feed content: {}", e),
                link: Some(resolved_url.clone()),
            })?,
        };

        let feed = parse_feed(&body, &resolved_url)?;
        tracing::debug!(url, items = feed.items.len(), "Fetched feed");

        Ok(FetchResponse {
            feed,
            validators,
            resolved_url,
        })
    }

    async fn fetch_favicon(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> std::result::Result<Option<Vec<u8>>, FetchError> {
        let Some(icon_url) = favicon_url(url) else {
            return Ok(None);
        };

        let request = self.client.get(&icon_url);
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            response = request.send() => response.map_err(|e| FetchError::Connection {
                message: describe_transport_error(&e),
                link: Some(icon_url.clone()),
            })?,
        };
        if !response.status().is_success() {
            return Ok(None);
        }

        let body = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            body = response.bytes() => body.map_err(|e| FetchError::Connection {
                message: format!("Failed to read favicon: {}", e),
                link: Some(icon_url.clone()),
            })?,
        };

        Ok(Some(body.to_vec()).filter(|data| !data.is_empty()))
    }

    fn provider_icon(&self, _url: &str) -> Option<Vec<u8>> {
        None
    }
}

/// `<origin>/favicon.ico` for http(s) URLs
fn favicon_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.join("/favicon.ico").ok().map(String::from)
}

/// Realm of a `Basic realm="..."` challenge
fn realm(headers: &HeaderMap) -> Option<String> {
    let challenge = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?;
    let start = challenge.find("realm=")? + "realm=".len();
    let rest = &challenge[start..];
    let realm = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split(',').next()?.trim(),
    };
    Some(realm.to_string()).filter(|r| !r.is_empty())
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Connection timed out".to_string()
    } else if e.is_connect() {
        format!("Could not connect: {}", e)
    } else {
        format!("Failed to fetch feed: {}", e)
    }
}
