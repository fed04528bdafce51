//! Bluesky thread fetching through the public AppView XRPC API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::error::{Error, Result};
use crate::thread::ThreadNode;

mod api;
pub mod url;

use api::{PostThreadResponse, ProfileResponse, ResolveHandleResponse, ThreadView, XrpcError};
pub use url::{AtUri, PostId};

/// A normalized thread plus the URI the caller asked for.
#[derive(Debug, Clone)]
pub struct FetchedThread {
    pub root: ThreadNode,
    /// AT URI of the requested post; differs from `root.uri` when the request
    /// was a reply and the thread was re-rooted.
    pub requested_uri: String,
}

/// Source of thread trees.
#[async_trait]
pub trait ThreadFetcher: Send + Sync {
    /// Fetch the thread containing `post_id` (a `bsky.app` URL or `at://` URI).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the post does not exist and
    /// [`Error::InvalidIdentifier`] if `post_id` cannot be parsed.
    async fn fetch(&self, post_id: &str) -> Result<FetchedThread>;
}

pub struct BlueskyClient {
    http: reqwest::Client,
    api_base: String,
    depth: u32,
    parent_height: u32,
    get_root: bool,
}

impl BlueskyClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_base: config.bsky_api_base.trim_end_matches('/').to_string(),
            depth: config.thread_depth,
            parent_height: config.parent_height,
            get_root: true,
        })
    }

    /// Return the thread rooted at the requested post instead of the
    /// conversation root.
    #[must_use]
    pub fn without_root(mut self) -> Self {
        self.get_root = false;
        self
    }

    /// Resolve a handle to a DID
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the handle does not resolve.
    pub async fn resolve_handle(&self, handle: &str) -> Result<String> {
        let url = format!(
            "{}/com.atproto.identity.resolveHandle?handle={}",
            self.api_base,
            urlencoding::encode(handle)
        );
        let response: ResolveHandleResponse = self
            .get_json(&url)
            .await
            .map_err(|e| match e {
                Error::Upstream { status: 400, .. } => {
                    Error::NotFound(format!("handle {handle} does not resolve"))
                }
                other => other,
            })?;
        debug!(handle, did = %response.did, "Resolved handle");
        Ok(response.did)
    }

    /// Current handle for a DID, via `app.bsky.actor.getProfile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile lookup fails.
    pub async fn get_handle(&self, did: &str) -> Result<String> {
        let url = format!(
            "{}/app.bsky.actor.getProfile?actor={}",
            self.api_base,
            urlencoding::encode(did)
        );
        let profile: ProfileResponse = self.get_json(&url).await?;
        Ok(profile.handle)
    }

    /// Convert a post URL or `at://` URI into a DID-based `at://` URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for unparseable input and
    /// [`Error::NotFound`] if the handle does not resolve.
    pub async fn to_at_uri(&self, input: &str) -> Result<String> {
        let id = PostId::parse(input)?;
        let actor = id.actor();
        let did = if actor.starts_with("did:") {
            actor.to_string()
        } else {
            self.resolve_handle(actor).await?
        };
        Ok(url::post_uri(&did, id.rkey()))
    }

    /// Convert a post `at://` URI into its `bsky.app` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] for unparseable input.
    pub async fn to_web_url(&self, input: &str) -> Result<String> {
        let id = PostId::parse(input)?;
        let actor = id.actor();
        let handle = if actor.starts_with("did:") {
            self.get_handle(actor).await?
        } else {
            actor.to_string()
        };
        Ok(url::web_url(&handle, id.rkey()))
    }

    async fn get_post_thread(&self, uri: &str) -> Result<api::ThreadViewPost> {
        let url = format!(
            "{}/app.bsky.feed.getPostThread?uri={}&depth={}&parentHeight={}",
            self.api_base,
            urlencoding::encode(uri),
            self.depth,
            self.parent_height
        );
        debug!(uri, "Fetching post thread");

        let response: PostThreadResponse = self.get_json(&url).await.map_err(|e| match e {
            Error::Upstream { status: 400, body } if is_not_found(&body) => {
                Error::NotFound(uri.to_string())
            }
            other => other,
        })?;

        match response.thread {
            ThreadView::Post(view) => Ok(*view),
            ThreadView::NotFound { uri: missing } => Err(Error::NotFound(missing)),
            ThreadView::Blocked { uri: blocked } => {
                Err(Error::NotFound(format!("{blocked} is blocked")))
            }
            ThreadView::Unknown => Err(Error::NotFound(format!(
                "{uri} returned an unrecognized thread view"
            ))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

fn is_not_found(body: &str) -> bool {
    serde_json::from_str::<XrpcError>(body).is_ok_and(|e| {
        e.error == "NotFound" || e.message.to_lowercase().contains("not found")
    })
}

#[async_trait]
impl ThreadFetcher for BlueskyClient {
    async fn fetch(&self, post_id: &str) -> Result<FetchedThread> {
        let requested_uri = self.to_at_uri(post_id).await?;
        let view = self.get_post_thread(&requested_uri).await?;

        let view = match view.root_uri() {
            Some(root_uri) if self.get_root && root_uri != requested_uri => {
                info!(root = %root_uri, "Post is a reply, fetching conversation root");
                self.get_post_thread(&root_uri).await?
            }
            _ => view,
        };

        let root = view.into_tree();
        info!(
            uri = %root.uri,
            posts = root.len(),
            "Fetched thread"
        );
        Ok(FetchedThread {
            root,
            requested_uri,
        })
    }
}
