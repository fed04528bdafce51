//! Thread → chat-message composition.

use tracing::{debug, warn};

use crate::constants::{
    LINK_MARKER, QUOTE_MARKER, TRANSCRIPT_MARKER, VIDEO_FAILED_PLACEHOLDER, VIDEO_SKIPPED_MARKER,
};
use crate::error::Result;
use crate::message::{ContentPart, Message, MessageContent, Role};
use crate::thread::{Attachment, AttachmentKind, ThreadIndex, ThreadNode};
use crate::video::VideoProcessor;

/// Which nodes to visit when no target post is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Every node, depth-first, replies in their fetched order.
    FullTree,
    /// The root, then the first reply at each level down to a leaf.
    FirstBranch,
}

#[derive(Debug, Clone)]
pub struct ComposeConfig {
    pub traversal: Traversal,
    /// Posts by this handle are sent as assistant turns.
    pub assistant_handle: Option<String>,
    /// Static instruction sent as a leading system message.
    pub system_preamble: Option<String>,
    /// When false, videos are referenced by URL and never downloaded.
    pub process_videos: bool,
}

impl ComposeConfig {
    #[must_use]
    pub fn new(traversal: Traversal) -> Self {
        Self {
            traversal,
            assistant_handle: None,
            system_preamble: None,
            process_videos: true,
        }
    }

    #[must_use]
    pub fn with_assistant_handle(mut self, handle: impl Into<String>) -> Self {
        self.assistant_handle = Some(handle.into());
        self
    }

    #[must_use]
    pub fn with_system_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.system_preamble = Some(preamble.into());
        self
    }

    fn role_for(&self, node: &ThreadNode) -> Role {
        let is_root = node.parent.is_none();
        let is_assistant = self
            .assistant_handle
            .as_deref()
            .is_some_and(|handle| handle == node.author.handle);
        if is_root || is_assistant {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

/// Convert a thread into chat messages, one per visited post.
///
/// With a `target`, the messages follow the path from the root to that post;
/// otherwise `config.traversal` picks the nodes. Video failures become an
/// inline placeholder and never abort the composition.
///
/// # Errors
///
/// Returns [`crate::Error::MalformedInput`] for a structurally broken tree and
/// [`crate::Error::NotFound`] if `target` is not in the tree. Both are
/// detected before any video is processed.
pub async fn compose(
    root: &ThreadNode,
    target: Option<&str>,
    config: &ComposeConfig,
    videos: &dyn VideoProcessor,
) -> Result<Vec<Message>> {
    let index = ThreadIndex::build(root)?;

    let nodes = match target {
        Some(uri) => index.path_to(uri)?,
        None => match config.traversal {
            Traversal::FullTree => {
                let mut out = Vec::with_capacity(index.len());
                depth_first(root, &mut out);
                out
            }
            Traversal::FirstBranch => first_branch(root),
        },
    };

    debug!(
        root = %root.uri,
        target = ?target,
        nodes = nodes.len(),
        "Composing messages"
    );

    let mut messages = Vec::with_capacity(nodes.len() + 1);
    if let Some(preamble) = &config.system_preamble {
        messages.push(Message::text(Role::System, preamble.clone()));
    }

    for node in nodes {
        let content = node_content(node, config, videos).await;
        messages.push(Message {
            role: config.role_for(node),
            content,
        });
    }

    Ok(messages)
}

fn depth_first<'a>(node: &'a ThreadNode, out: &mut Vec<&'a ThreadNode>) {
    out.push(node);
    for reply in &node.replies {
        depth_first(reply, out);
    }
}

fn first_branch(root: &ThreadNode) -> Vec<&ThreadNode> {
    let mut out = vec![root];
    let mut node = root;
    while let Some(first) = node.replies.first() {
        out.push(first);
        node = first;
    }
    out
}

async fn node_content(
    node: &ThreadNode,
    config: &ComposeConfig,
    videos: &dyn VideoProcessor,
) -> MessageContent {
    if node.attachments.is_empty() {
        return MessageContent::Text(node.text.clone());
    }

    let mut parts = Vec::new();
    if !node.text.is_empty() {
        parts.push(ContentPart::text(node.text.clone()));
    }

    for attachment in &node.attachments {
        match attachment.kind {
            AttachmentKind::Image => parts.push(ContentPart::image(attachment.url.clone())),
            AttachmentKind::Link => parts.push(ContentPart::text(link_text(attachment))),
            AttachmentKind::Quote => parts.push(ContentPart::text(quote_text(attachment))),
            AttachmentKind::Video if !config.process_videos => {
                parts.push(ContentPart::text(format!(
                    "{VIDEO_SKIPPED_MARKER}{}",
                    attachment.url
                )));
            }
            AttachmentKind::Video => match videos.process(&attachment.url).await {
                Ok(result) => {
                    debug!(
                        post = %node.uri,
                        frames = result.frames.len(),
                        transcript_len = result.transcript.len(),
                        "Video processed"
                    );
                    parts.extend(result.frames.into_iter().map(ContentPart::image));
                    if !result.transcript.is_empty() {
                        parts.push(ContentPart::text(format!(
                            "{TRANSCRIPT_MARKER}{}",
                            result.transcript
                        )));
                    }
                }
                Err(e) => {
                    warn!(post = %node.uri, video = %attachment.url, "Video processing failed: {e}");
                    parts.push(ContentPart::text(VIDEO_FAILED_PLACEHOLDER));
                }
            },
        }
    }

    if parts.is_empty() {
        MessageContent::Text(node.text.clone())
    } else {
        MessageContent::Parts(parts)
    }
}

fn link_text(link: &Attachment) -> String {
    match link.title.as_deref().filter(|t| !t.is_empty()) {
        Some(title) => format!("{LINK_MARKER}{title} {}", link.url),
        None => format!("{LINK_MARKER}{}", link.url),
    }
}

/// `[Quote] @handle: text`. Without text (deleted or blocked posts) the URI stands in.
fn quote_text(quote: &Attachment) -> String {
    match (quote.title.as_deref(), quote.description.as_deref()) {
        (Some(handle), Some(text)) => format!("{QUOTE_MARKER}@{handle}: {text}"),
        (None, Some(text)) => format!("{QUOTE_MARKER}{text}"),
        (_, None) => format!("{QUOTE_MARKER}{}", quote.url),
    }
}
