//! Normalized thread model.
//!
//! A [`ThreadNode`] owns its replies. Parent links are stored as URIs and
//! resolved through a [`ThreadIndex`] built on demand, so the tree never holds
//! a cycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Author of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Author {
    /// Display name if set and non-empty, else the handle.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Link,
    /// Embedded post. `url` is its `at://` URI, `title` the quoted author's
    /// handle and `description` the quoted text.
    Quote,
}

/// Media or link referenced by a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Attachment {
    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        Self::new(AttachmentKind::Image, url)
    }

    #[must_use]
    pub fn video(url: impl Into<String>) -> Self {
        Self::new(AttachmentKind::Video, url)
    }

    #[must_use]
    pub fn link(url: impl Into<String>) -> Self {
        Self::new(AttachmentKind::Link, url)
    }

    /// Quoted post with its author handle and text, when the view carries them.
    #[must_use]
    pub fn quote(uri: impl Into<String>, handle: Option<String>, text: Option<String>) -> Self {
        Self {
            title: handle,
            description: text,
            ..Self::new(AttachmentKind::Quote, uri)
        }
    }

    fn new(kind: AttachmentKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            alt: None,
            title: None,
            description: None,
            thumbnail: None,
        }
    }
}

/// One post and its replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
    pub author: Author,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub replies: Vec<ThreadNode>,
    /// URI of the parent post. `None` only for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub repost_count: u64,
    #[serde(default)]
    pub like_count: u64,
}

impl ThreadNode {
    /// Create a node with no attachments, replies or parent.
    #[must_use]
    pub fn new(uri: impl Into<String>, handle: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            cid: String::new(),
            author: Author {
                did: String::new(),
                handle: handle.into(),
                display_name: None,
            },
            text: text.into(),
            created_at: None,
            attachments: Vec::new(),
            replies: Vec::new(),
            parent: None,
            reply_count: 0,
            repost_count: 0,
            like_count: 0,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Append a reply, pointing its parent link at this node.
    #[must_use]
    pub fn with_reply(mut self, mut reply: ThreadNode) -> Self {
        reply.parent = Some(self.uri.clone());
        self.replies.push(reply);
        self
    }

    /// Total number of nodes in this subtree.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.replies.iter().map(ThreadNode::len).sum::<usize>()
    }

    /// A node always counts itself, so a tree is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Last path segment of the URI (the record key for post URIs).
    #[must_use]
    pub fn rkey(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or(&self.uri)
    }
}

/// URI lookup over a validated tree.
#[derive(Debug)]
pub struct ThreadIndex<'a> {
    root: &'a ThreadNode,
    nodes: HashMap<&'a str, &'a ThreadNode>,
}

impl<'a> ThreadIndex<'a> {
    /// Index every node of the tree, checking its structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the root has a parent, a URI
    /// appears twice, or a reply's parent link does not name its container.
    pub fn build(root: &'a ThreadNode) -> Result<Self> {
        if let Some(parent) = &root.parent {
            return Err(Error::MalformedInput(format!(
                "root {} has parent link {parent}",
                root.uri
            )));
        }

        let mut nodes = HashMap::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if nodes.insert(node.uri.as_str(), node).is_some() {
                return Err(Error::MalformedInput(format!(
                    "duplicate post uri {}",
                    node.uri
                )));
            }
            for reply in &node.replies {
                if reply.parent.as_deref() != Some(node.uri.as_str()) {
                    return Err(Error::MalformedInput(format!(
                        "reply {} has parent link {:?} but is nested under {}",
                        reply.uri, reply.parent, node.uri
                    )));
                }
                stack.push(reply);
            }
        }

        Ok(Self { root, nodes })
    }

    #[must_use]
    pub fn root(&self) -> &'a ThreadNode {
        self.root
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&'a ThreadNode> {
        self.nodes.get(uri).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes from the root down to `uri`, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `uri` is not in the tree, and
    /// [`Error::MalformedInput`] if a parent link dangles.
    pub fn path_to(&self, uri: &str) -> Result<Vec<&'a ThreadNode>> {
        let mut node = self
            .get(uri)
            .ok_or_else(|| Error::NotFound(format!("post {uri} is not part of this thread")))?;

        let mut path = vec![node];
        while let Some(parent_uri) = node.parent.as_deref() {
            node = self.get(parent_uri).ok_or_else(|| {
                Error::MalformedInput(format!(
                    "post {} points at missing parent {parent_uri}",
                    node.uri
                ))
            })?;
            path.push(node);
        }
        path.reverse();
        Ok(path)
    }
}
