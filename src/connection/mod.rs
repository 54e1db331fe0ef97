//! Network seam: fetching feeds and favicons.
//!
//! [`FeedConnection`] is what the reload pipeline talks to. [`HttpFeedConnection`]
//! is the production implementation over `reqwest`, parsing RSS first and Atom
//! second.

mod http;
mod parse;


pub use http::HttpFeedConnection;
pub use parse::parse_feed;

use crate::error::FetchError;
use crate::types::{FetchProperties, FetchResponse};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Fetches feeds and their icons
#[async_trait]
pub trait FeedConnection: Send + Sync {
    /// Fetch and parse the feed at `url`
    ///
    /// Implementations must give up with [`FetchError::Cancelled`] once `token`
    /// fires and report unchanged content as [`FetchError::NotModified`] when the
    /// validators in `properties` still match.
    async fn fetch(
        &self,
        url: &str,
        token: &CancellationToken,
        properties: FetchProperties,
    ) -> Result<FetchResponse, FetchError>;

    /// Fetch the icon of the site at `url`; `Ok(None)` if it has none
    async fn fetch_favicon(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, FetchError>;

    /// Built-in icon for provider-specific feeds, looked up without network access
    fn provider_icon(&self, url: &str) -> Option<Vec<u8>>;
}
