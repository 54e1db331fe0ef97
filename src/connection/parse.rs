//! RSS / Atom to [`Feed`] mapping.

use crate::error::FetchError;
use crate::types::{Feed, FeedItem};
use chrono::Utc;

/// Parse a feed document, trying RSS first and Atom second
///
/// Malformed XML is a [`FetchError::Parse`]; a well-formed document that is
/// neither RSS nor Atom is a [`FetchError::Interpret`]. `link` is attached to
/// either error so the user can open the offending document.
pub fn parse_feed(body: &[u8], link: &str) -> Result<Feed, FetchError> {
    match rss::Channel::read_from(body) {
        Ok(channel) => Ok(from_rss(&channel)),
        Err(rss::Error::InvalidStartTag) => match atom_syndication::Feed::read_from(body) {
            Ok(feed) => Ok(from_atom(&feed)),
            Err(atom_syndication::Error::InvalidStartTag) => Err(FetchError::Interpret {
                message: "Document is neither an RSS nor an Atom feed".to_string(),
                link: Some(link.to_string()),
            }),
            Err(e) => Err(FetchError::Parse {
                message: format!("Atom parse error: {}", e),
                link: Some(link.to_string()),
            }),
        },
        Err(e) => Err(FetchError::Parse {
            message: format!("RSS parse error: {}", e),
            link: Some(link.to_string()),
        }),
    }
}

fn from_rss(channel: &rss::Channel) -> Feed {
    let items = channel
        .items()
        .iter()
        .map(|item| {
            // guid, then link, then title
            let guid = item
                .guid()
                .map(|g| g.value().to_string())
                .or_else(|| item.link().map(str::to_string))
                .unwrap_or_else(|| item.title().unwrap_or("").to_string());

            let published = item.pub_date().and_then(|date| {
                chrono::DateTime::parse_from_rfc2822(date)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            });

            FeedItem {
                guid,
                title: item.title().unwrap_or("").to_string(),
                link: item.link().map(str::to_string),
                published,
                summary: item.description().map(str::to_string),
            }
        })
        .collect();

    Feed {
        title: Some(channel.title().to_string()).filter(|t| !t.is_empty()),
        homepage: Some(channel.link().to_string()).filter(|l| !l.is_empty()),
        items,
    }
}

fn from_atom(feed: &atom_syndication::Feed) -> Feed {
    let items = feed
        .entries()
        .iter()
        .map(|entry| {
            let published = entry
                .published()
                .or_else(|| Some(entry.updated()))
                .and_then(|dt| {
                    chrono::DateTime::parse_from_rfc3339(&dt.to_rfc3339())
                        .ok()
                        .map(|dt| dt.with_timezone(&Utc))
                });

            let summary = entry.summary().map(|s| s.as_str().to_string()).or_else(|| {
                entry
                    .content()
                    .and_then(|c| c.value().map(str::to_string))
            });

            FeedItem {
                guid: entry.id().to_string(),
                title: entry.title().as_str().to_string(),
                link: entry.links().first().map(|link| link.href().to_string()),
                published,
                summary,
            }
        })
        .collect();

    let homepage = feed
        .links()
        .iter()
        .find(|link| link.rel() == "alternate")
        .or_else(|| feed.links().first())
        .map(|link| link.href().to_string());

    Feed {
        title: Some(feed.title().as_str().to_string()).filter(|t| !t.is_empty()),
        homepage,
        items,
    }
}
