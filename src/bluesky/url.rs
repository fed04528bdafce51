//! Conversion between `bsky.app` web URLs and `at://` post URIs.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Collection NSID for posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

static WEB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?bsky\.(?:app|social)/profile/([^/?#]+)/post/([^/?&#]+)")
        .unwrap()
});

static AT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^at://([^/]+)/([^/]+)/([^/?#]+)$").unwrap());

/// Components of an `at://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri {
    pub authority: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    /// Whether the authority is already a DID rather than a handle.
    #[must_use]
    pub fn has_did(&self) -> bool {
        self.authority.starts_with("did:")
    }
}

impl std::fmt::Display for AtUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at://{}/{}/{}", self.authority, self.collection, self.rkey)
    }
}

/// Parse handle (or DID) and record key from a Bluesky post URL.
#[must_use]
pub fn parse_web_url(url: &str) -> Option<(String, String)> {
    WEB_URL
        .captures(url.trim())
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Parse an `at://` URI into its components.
#[must_use]
pub fn parse_at_uri(uri: &str) -> Option<AtUri> {
    AT_URI.captures(uri.trim()).map(|caps| AtUri {
        authority: caps[1].to_string(),
        collection: caps[2].to_string(),
        rkey: caps[3].to_string(),
    })
}

/// Build a post URI from an author DID and record key.
#[must_use]
pub fn post_uri(did: &str, rkey: &str) -> String {
    format!("at://{did}/{POST_COLLECTION}/{rkey}")
}

/// Build the `bsky.app` URL for a post.
#[must_use]
pub fn web_url(handle: &str, rkey: &str) -> String {
    format!("https://bsky.app/profile/{handle}/post/{rkey}")
}

/// A post identifier as typed by a user, before handle resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostId {
    /// `at://` URI; the authority may still be a handle.
    AtUri(AtUri),
    /// Web URL reduced to `(handle or DID, rkey)`.
    Web { actor: String, rkey: String },
}

impl PostId {
    /// Classify a user-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if it is neither a post URL nor
    /// an `at://` post URI.
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim_start().starts_with("at://") {
            return match parse_at_uri(input) {
                Some(uri) if uri.collection == POST_COLLECTION => Ok(Self::AtUri(uri)),
                _ => Err(Error::InvalidIdentifier(input.to_string())),
            };
        }
        parse_web_url(input)
            .map(|(actor, rkey)| Self::Web { actor, rkey })
            .ok_or_else(|| Error::InvalidIdentifier(input.to_string()))
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        match self {
            Self::AtUri(uri) => &uri.authority,
            Self::Web { actor, .. } => actor,
        }
    }

    #[must_use]
    pub fn rkey(&self) -> &str {
        match self {
            Self::AtUri(uri) => &uri.rkey,
            Self::Web { rkey, .. } => rkey,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_web_url() {
        assert_eq!(
            parse_web_url("https://bsky.app/profile/alice.bsky.social/post/3kabc123"),
            Some(("alice.bsky.social".to_string(), "3kabc123".to_string()))
        );
        assert_eq!(
            parse_web_url("https://www.bsky.app/profile/bob.dev/post/xyz?ref=share"),
            Some(("bob.dev".to_string(), "xyz".to_string()))
        );
        assert_eq!(
            parse_web_url("https://bsky.social/profile/did:plc:abc/post/123"),
            Some(("did:plc:abc".to_string(), "123".to_string()))
        );
        assert_eq!(parse_web_url("https://bsky.app/profile/alice"), None);
        assert_eq!(parse_web_url("https://twitter.com/user/status/123"), None);
    }

    #[test]
    fn test_parse_at_uri() {
        let uri = parse_at_uri("at://did:plc:abc/app.bsky.feed.post/3kxyz").unwrap();
        assert_eq!(uri.authority, "did:plc:abc");
        assert_eq!(uri.collection, POST_COLLECTION);
        assert_eq!(uri.rkey, "3kxyz");
        assert!(uri.has_did());
        assert_eq!(uri.to_string(), "at://did:plc:abc/app.bsky.feed.post/3kxyz");

        assert!(parse_at_uri("at://did:plc:abc").is_none());
    }

    #[test]
    fn test_post_id_parse() {
        let id = PostId::parse("https://bsky.app/profile/alice.bsky.social/post/3k").unwrap();
        assert_eq!(id.actor(), "alice.bsky.social");
        assert_eq!(id.rkey(), "3k");

        let id = PostId::parse("at://alice.bsky.social/app.bsky.feed.post/3k").unwrap();
        assert!(matches!(&id, PostId::AtUri(uri) if !uri.has_did()));

        assert!(matches!(
            PostId::parse("at://did:plc:abc/app.bsky.actor.profile/self"),
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(matches!(
            PostId::parse("not a post"),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_uri_builders() {
        assert_eq!(post_uri("did:plc:abc", "3k"), "at://did:plc:abc/app.bsky.feed.post/3k");
        assert_eq!(web_url("alice.bsky.social", "3k"), "https://bsky.app/profile/alice.bsky.social/post/3k");
    }
}
