//! Wire types for `app.bsky.feed.getPostThread` and their normalization
//! into [`ThreadNode`] trees.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::url::POST_COLLECTION;
use crate::thread::{Attachment, Author, ThreadNode};

/// Response from resolveHandle API
#[derive(Debug, Deserialize)]
pub(crate) struct ResolveHandleResponse {
    pub did: String,
}

/// Response from getProfile API (only the fields we read)
#[derive(Debug, Deserialize)]
pub(crate) struct ProfileResponse {
    pub handle: String,
}

/// XRPC error body, e.g. `{"error": "NotFound", "message": "Post not found: ..."}`
#[derive(Debug, Deserialize)]
pub(crate) struct XrpcError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// Response from getPostThread API
#[derive(Debug, Deserialize)]
pub(crate) struct PostThreadResponse {
    pub thread: ThreadView,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum ThreadView {
    #[serde(rename = "app.bsky.feed.defs#threadViewPost")]
    Post(Box<ThreadViewPost>),
    #[serde(rename = "app.bsky.feed.defs#notFoundPost")]
    NotFound { uri: String },
    #[serde(rename = "app.bsky.feed.defs#blockedPost")]
    Blocked { uri: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadViewPost {
    pub post: Post,
    #[serde(default)]
    pub parent: Option<ThreadView>,
    #[serde(default)]
    pub replies: Vec<ThreadView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Post {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
    pub author: PostAuthor,
    pub record: PostRecord,
    #[serde(default)]
    pub embed: Option<Embed>,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub repost_count: u64,
    #[serde(default)]
    pub like_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostAuthor {
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecord {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyRef {
    pub root: StrongRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StrongRef {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
pub(crate) enum Embed {
    #[serde(rename = "app.bsky.embed.images#view")]
    Images {
        #[serde(default)]
        images: Vec<EmbedImage>,
    },
    #[serde(rename = "app.bsky.embed.external#view")]
    External { external: ExternalEmbed },
    #[serde(rename = "app.bsky.embed.video#view")]
    Video(VideoEmbed),
    #[serde(rename = "app.bsky.embed.record#view")]
    Record {
        #[serde(default)]
        record: EmbedRecord,
    },
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia {
        #[serde(default)]
        record: Option<RecordView>,
        media: Box<Embed>,
    },
    #[serde(other)]
    Unknown,
}

/// The `record` half of a recordWithMedia view.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordView {
    #[serde(default)]
    pub record: EmbedRecord,
}

/// Quoted record. Only `viewRecord` carries an author and value; the
/// not-found, blocked and detached views carry just the URI.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct EmbedRecord {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub author: Option<QuotedAuthor>,
    #[serde(default)]
    pub value: Option<QuotedValue>,
}

/// `viewBlocked` authors carry a DID but no handle.
#[derive(Debug, Deserialize)]
pub(crate) struct QuotedAuthor {
    #[serde(default)]
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotedValue {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbedImage {
    pub fullsize: String,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExternalEmbed {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumb: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoEmbed {
    pub playlist: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

impl ThreadViewPost {
    /// URI of the conversation root, if this post is a reply.
    ///
    /// Prefers the root reference in the record and falls back to the top of
    /// the returned parent chain.
    pub fn root_uri(&self) -> Option<String> {
        if let Some(reply) = &self.post.record.reply {
            return Some(reply.root.uri.clone());
        }

        let mut top = None;
        let mut parent = self.parent.as_ref();
        while let Some(ThreadView::Post(view)) = parent {
            top = Some(view.post.uri.clone());
            parent = view.parent.as_ref();
        }
        top
    }

    /// Normalize this view and its replies into a tree rooted here.
    pub fn into_tree(self) -> ThreadNode {
        self.into_node(None)
    }

    fn into_node(self, parent: Option<&str>) -> ThreadNode {
        let post = self.post;
        let uri = post.uri;

        let mut replies: Vec<ThreadNode> = self
            .replies
            .into_iter()
            .filter_map(|reply| match reply {
                ThreadView::Post(view) => Some((*view).into_node(Some(&uri))),
                ThreadView::NotFound { .. } | ThreadView::Blocked { .. } | ThreadView::Unknown => {
                    None
                }
            })
            .collect();
        // Chronological; posts without a timestamp keep their order at the end
        replies.sort_by_key(|n| n.created_at.map_or(i64::MAX, |t| t.timestamp_millis()));

        ThreadNode {
            cid: post.cid,
            author: Author {
                did: post.author.did,
                handle: post.author.handle,
                display_name: post.author.display_name.filter(|n| !n.is_empty()),
            },
            text: post.record.text,
            created_at: post.record.created_at.as_deref().and_then(parse_timestamp),
            attachments: post.embed.map(attachments).unwrap_or_default(),
            replies,
            parent: parent.map(ToString::to_string),
            reply_count: post.reply_count,
            repost_count: post.repost_count,
            like_count: post.like_count,
            uri,
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn attachments(embed: Embed) -> Vec<Attachment> {
    match embed {
        Embed::Images { images } => images
            .into_iter()
            .filter(|img| !img.fullsize.is_empty())
            .map(|img| Attachment {
                alt: img.alt.filter(|a| !a.is_empty()),
                ..Attachment::image(img.fullsize)
            })
            .collect(),
        Embed::External { external } => vec![Attachment {
            title: Some(external.title).filter(|t| !t.is_empty()),
            description: Some(external.description).filter(|d| !d.is_empty()),
            thumbnail: external.thumb,
            ..Attachment::link(external.uri)
        }],
        Embed::Video(video) => vec![Attachment {
            alt: video.alt.filter(|a| !a.is_empty()),
            thumbnail: video.thumbnail,
            ..Attachment::video(video.playlist)
        }],
        Embed::Record { record } => quote(record).into_iter().collect(),
        Embed::RecordWithMedia { record, media } => {
            let mut out = attachments(*media);
            out.extend(record.and_then(|r| quote(r.record)));
            out
        }
        Embed::Unknown => Vec::new(),
    }
}

/// Quoted posts only; feed generators, lists and starter packs are skipped.
fn quote(record: EmbedRecord) -> Option<Attachment> {
    if !record.uri.contains(&format!("/{POST_COLLECTION}/")) {
        return None;
    }
    Some(Attachment::quote(
        record.uri,
        record.author.map(|a| a.handle).filter(|h| !h.is_empty()),
        record.value.map(|v| v.text).filter(|t| !t.is_empty()),
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::thread::{AttachmentKind, ThreadIndex};

    fn post_json(uri: &str, handle: &str, text: &str, created_at: &str) -> serde_json::Value {
        json!({
            "uri": uri,
            "cid": "bafy",
            "author": {"did": format!("did:plc:{handle}"), "handle": handle, "displayName": ""},
            "record": {"$type": "app.bsky.feed.post", "text": text, "createdAt": created_at},
            "replyCount": 0,
            "repostCount": 0,
            "likeCount": 3,
            "indexedAt": created_at
        })
    }

    fn view(post: serde_json::Value, replies: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "$type": "app.bsky.feed.defs#threadViewPost",
            "post": post,
            "replies": replies
        })
    }

    fn parse(thread: serde_json::Value) -> ThreadViewPost {
        let response: PostThreadResponse =
            serde_json::from_value(json!({ "thread": thread })).unwrap();
        match response.thread {
            ThreadView::Post(view) => *view,
            other => panic!("expected a post view, got {other:?}"),
        }
    }

    #[test]
    fn test_replies_are_normalized_with_parent_links() {
        let thread = view(
            post_json("at://op/app.bsky.feed.post/1", "op.bsky", "root", "2024-05-01T10:00:00Z"),
            vec![
                view(
                    post_json("at://b/app.bsky.feed.post/3", "b.bsky", "later", "2024-05-01T12:00:00Z"),
                    vec![],
                ),
                view(
                    post_json("at://a/app.bsky.feed.post/2", "a.bsky", "earlier", "2024-05-01T11:00:00Z"),
                    vec![],
                ),
                json!({"$type": "app.bsky.feed.defs#blockedPost", "uri": "at://x/app.bsky.feed.post/9", "blocked": true}),
                json!({"$type": "app.bsky.feed.defs#notFoundPost", "uri": "at://y/app.bsky.feed.post/8", "notFound": true}),
            ],
        );

        let root = parse(thread).into_tree();

        assert_eq!(root.parent, None);
        assert_eq!(root.author.display_name, None);
        assert_eq!(root.like_count, 3);
        let texts: Vec<&str> = root.replies.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["earlier", "later"]);
        assert_eq!(root.replies[0].parent.as_deref(), Some("at://op/app.bsky.feed.post/1"));
        assert!(ThreadIndex::build(&root).is_ok());
    }

    #[test]
    fn test_image_and_external_embeds() {
        let mut post = post_json("at://op/app.bsky.feed.post/1", "op.bsky", "pics", "2024-05-01T10:00:00Z");
        post["embed"] = json!({
            "$type": "app.bsky.embed.images#view",
            "images": [
                {"thumb": "https://cdn/t1", "fullsize": "https://cdn/f1", "alt": "first"},
                {"thumb": "https://cdn/t2", "fullsize": "https://cdn/f2", "alt": ""}
            ]
        });
        let root = parse(view(post, vec![])).into_tree();

        assert_eq!(root.attachments.len(), 2);
        assert_eq!(root.attachments[0].kind, AttachmentKind::Image);
        assert_eq!(root.attachments[0].url, "https://cdn/f1");
        assert_eq!(root.attachments[0].alt.as_deref(), Some("first"));
        assert_eq!(root.attachments[1].alt, None);

        let mut post = post_json("at://op/app.bsky.feed.post/1", "op.bsky", "link", "2024-05-01T10:00:00Z");
        post["embed"] = json!({
            "$type": "app.bsky.embed.external#view",
            "external": {"uri": "https://example.com", "title": "Example", "description": "", "thumb": "https://cdn/thumb"}
        });
        let root = parse(view(post, vec![])).into_tree();

        assert_eq!(root.attachments[0].kind, AttachmentKind::Link);
        assert_eq!(root.attachments[0].title.as_deref(), Some("Example"));
        assert_eq!(root.attachments[0].description, None);
        assert_eq!(root.attachments[0].thumbnail.as_deref(), Some("https://cdn/thumb"));
    }

    #[test]
    fn test_video_inside_record_with_media() {
        let mut post = post_json("at://op/app.bsky.feed.post/1", "op.bsky", "quote", "2024-05-01T10:00:00Z");
        post["embed"] = json!({
            "$type": "app.bsky.embed.recordWithMedia#view",
            "record": {"record": {"uri": "at://q/app.bsky.feed.post/5"}},
            "media": {
                "$type": "app.bsky.embed.video#view",
                "cid": "bafyvideo",
                "playlist": "https://video.bsky.app/watch/x/playlist.m3u8",
                "thumbnail": "https://video.bsky.app/watch/x/thumbnail.jpg"
            }
        });
        let root = parse(view(post, vec![])).into_tree();

        assert_eq!(root.attachments.len(), 2);
        assert_eq!(root.attachments[0].kind, AttachmentKind::Video);
        assert_eq!(root.attachments[0].url, "https://video.bsky.app/watch/x/playlist.m3u8");
        assert_eq!(root.attachments[1], Attachment::quote("at://q/app.bsky.feed.post/5", None, None));
    }

    #[test]
    fn test_quote_post_keeps_author_and_text() {
        let mut post = post_json("at://op/app.bsky.feed.post/1", "op.bsky", "this", "2024-05-01T10:00:00Z");
        post["embed"] = json!({
            "$type": "app.bsky.embed.record#view",
            "record": {
                "$type": "app.bsky.embed.record#viewRecord",
                "uri": "at://did:plc:q/app.bsky.feed.post/5",
                "cid": "bafyquoted",
                "author": {"did": "did:plc:q", "handle": "quoted.bsky", "displayName": "Quoted"},
                "value": {"$type": "app.bsky.feed.post", "text": "original take", "createdAt": "2024-04-30T09:00:00Z"},
                "indexedAt": "2024-04-30T09:00:00Z"
            }
        });
        let root = parse(view(post, vec![])).into_tree();

        assert_eq!(root.attachments.len(), 1);
        let quote = &root.attachments[0];
        assert_eq!(quote.kind, AttachmentKind::Quote);
        assert_eq!(quote.url, "at://did:plc:q/app.bsky.feed.post/5");
        assert_eq!(quote.title.as_deref(), Some("quoted.bsky"));
        assert_eq!(quote.description.as_deref(), Some("original take"));
    }

    #[test]
    fn test_quoted_feed_generator_is_skipped() {
        let mut post = post_json("at://op/app.bsky.feed.post/1", "op.bsky", "feed", "2024-05-01T10:00:00Z");
        post["embed"] = json!({
            "$type": "app.bsky.embed.record#view",
            "record": {
                "$type": "app.bsky.feed.defs#generatorView",
                "uri": "at://did:plc:q/app.bsky.feed.generator/cats",
                "displayName": "Cats"
            }
        });
        let root = parse(view(post, vec![])).into_tree();
        assert!(root.attachments.is_empty());
    }

    #[test]
    fn test_unknown_embed_is_ignored() {
        let mut post = post_json("at://op/app.bsky.feed.post/1", "op.bsky", "new", "2024-05-01T10:00:00Z");
        post["embed"] = json!({"$type": "app.bsky.embed.somethingNew#view", "payload": {}});
        let root = parse(view(post, vec![])).into_tree();
        assert!(root.attachments.is_empty());
    }

    #[test]
    fn test_root_uri_from_record_reply() {
        let mut post = post_json("at://b/app.bsky.feed.post/2", "b.bsky", "reply", "2024-05-01T11:00:00Z");
        post["record"]["reply"] = json!({
            "root": {"uri": "at://op/app.bsky.feed.post/1", "cid": "bafy"},
            "parent": {"uri": "at://op/app.bsky.feed.post/1", "cid": "bafy"}
        });
        assert_eq!(
            parse(view(post, vec![])).root_uri().as_deref(),
            Some("at://op/app.bsky.feed.post/1")
        );
    }

    #[test]
    fn test_root_uri_from_parent_chain() {
        let mut thread = view(
            post_json("at://c/app.bsky.feed.post/3", "c.bsky", "deep", "2024-05-01T12:00:00Z"),
            vec![],
        );
        let mut middle = view(
            post_json("at://b/app.bsky.feed.post/2", "b.bsky", "mid", "2024-05-01T11:00:00Z"),
            vec![],
        );
        middle["parent"] = view(
            post_json("at://op/app.bsky.feed.post/1", "op.bsky", "top", "2024-05-01T10:00:00Z"),
            vec![],
        );
        thread["parent"] = middle;

        assert_eq!(
            parse(thread).root_uri().as_deref(),
            Some("at://op/app.bsky.feed.post/1")
        );
    }

    #[test]
    fn test_top_level_post_has_no_root_uri() {
        let thread = view(
            post_json("at://op/app.bsky.feed.post/1", "op.bsky", "top", "2024-05-01T10:00:00Z"),
            vec![],
        );
        assert_eq!(parse(thread).root_uri(), None);
    }
}
