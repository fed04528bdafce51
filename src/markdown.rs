//! Human-readable markdown rendering of a thread.
//!
//! Each post is rendered through a template with `{field}` placeholders:
//! `{displayName}`, `{handle}`, `{text}`, `{index}`, `{indent}`, `{depth}`,
//! `{createdAt}`, `{likeCount}`, `{replyCount}`, `{repostCount}` and `{uri}`.
//! Unknown placeholders are left untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::thread::{Attachment, AttachmentKind, ThreadNode};

/// Layout used when no template is given.
pub const DEFAULT_TEMPLATE: &str = "**{displayName}** (@{handle}):\n{text}\n\n";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownOptions {
    pub include_replies: bool,
    /// Deepest reply level to render; the root is depth 0. `None` renders everything.
    pub max_depth: Option<usize>,
    /// Prefix each post with its hierarchical index, e.g. `[1.2.1]`.
    pub include_indices: bool,
    /// Per-post template, see the module docs for the fields.
    pub template: String,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            include_replies: true,
            max_depth: None,
            include_indices: false,
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Render `root` and (optionally) its replies, depth-first.
#[must_use]
pub fn render_markdown(root: &ThreadNode, options: &MarkdownOptions) -> String {
    let mut out = String::new();
    let mut index = vec![1];
    render_node(root, options, 0, &mut index, &mut out);
    out
}

fn render_node(
    node: &ThreadNode,
    options: &MarkdownOptions,
    depth: usize,
    index: &mut Vec<usize>,
    out: &mut String,
) {
    let joined = index
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".");
    if options.include_indices {
        out.push_str(&format!("[{joined}] "));
    }
    out.push_str(&fill_template(&options.template, node, &joined, depth));

    if !node.attachments.is_empty() {
        for attachment in &node.attachments {
            out.push_str(&attachment_line(attachment));
            out.push('\n');
        }
        out.push('\n');
    }

    let descend = options.include_replies && !matches!(options.max_depth, Some(max) if depth >= max);
    if !descend {
        return;
    }
    for (i, reply) in node.replies.iter().enumerate() {
        index.push(i + 1);
        render_node(reply, options, depth + 1, index, out);
        index.pop();
    }
}

fn fill_template(template: &str, node: &ThreadNode, index: &str, depth: usize) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "displayName" => node.author.name().to_string(),
            "handle" => node.author.handle.clone(),
            "text" => node.text.clone(),
            "index" => index.to_string(),
            "indent" => "  ".repeat(depth),
            "depth" => depth.to_string(),
            "createdAt" => node
                .created_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            "likeCount" => node.like_count.to_string(),
            "replyCount" => node.reply_count.to_string(),
            "repostCount" => node.repost_count.to_string(),
            "uri" => node.uri.clone(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn attachment_line(attachment: &Attachment) -> String {
    match attachment.kind {
        AttachmentKind::Image => {
            format!("![{}]({})", attachment.alt.as_deref().unwrap_or(""), attachment.url)
        }
        AttachmentKind::Video => format!("[Video]({})", attachment.url),
        AttachmentKind::Link => format!(
            "[{}]({})",
            attachment.title.as_deref().unwrap_or(&attachment.url),
            attachment.url
        ),
        AttachmentKind::Quote => quote_block(attachment),
    }
}

fn quote_block(quote: &Attachment) -> String {
    let body = quote.description.as_deref().unwrap_or(&quote.url);
    let body = match quote.title.as_deref() {
        Some(handle) => format!("**@{handle}**: {body}"),
        None => body.to_string(),
    };
    body.lines()
        .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample() -> ThreadNode {
        let mut alice = ThreadNode::new("at://a/app.bsky.feed.post/1", "alice.bsky.social", "Root post");
        alice.author.display_name = Some("Alice".to_string());

        let bob = ThreadNode::new("at://b/app.bsky.feed.post/2", "bob.bsky.social", "First reply")
            .with_reply(ThreadNode::new(
                "at://c/app.bsky.feed.post/4",
                "carol.bsky.social",
                "Nested",
            ));
        let dave = ThreadNode::new("at://d/app.bsky.feed.post/3", "dave.bsky.social", "Second reply");

        alice.with_reply(bob).with_reply(dave)
    }

    #[test]
    fn test_render_full_thread() {
        let md = render_markdown(&sample(), &MarkdownOptions::default());
        assert_eq!(
            md,
            "**Alice** (@alice.bsky.social):\nRoot post\n\n\
             **bob.bsky.social** (@bob.bsky.social):\nFirst reply\n\n\
             **carol.bsky.social** (@carol.bsky.social):\nNested\n\n\
             **dave.bsky.social** (@dave.bsky.social):\nSecond reply\n\n"
        );
    }

    #[test]
    fn test_hierarchical_indices() {
        let options = MarkdownOptions {
            include_indices: true,
            ..MarkdownOptions::default()
        };
        let md = render_markdown(&sample(), &options);
        let indices: Vec<&str> = md
            .lines()
            .filter(|l| l.starts_with('['))
            .map(|l| l.split(']').next().unwrap_or(""))
            .collect();
        assert_eq!(indices, vec!["[1", "[1.1", "[1.1.1", "[1.2"]);
    }

    #[test]
    fn test_max_depth_and_no_replies() {
        let options = MarkdownOptions {
            max_depth: Some(1),
            ..MarkdownOptions::default()
        };
        let md = render_markdown(&sample(), &options);
        assert!(md.contains("First reply"));
        assert!(!md.contains("Nested"));

        let options = MarkdownOptions {
            include_replies: false,
            ..MarkdownOptions::default()
        };
        let md = render_markdown(&sample(), &options);
        assert_eq!(md, "**Alice** (@alice.bsky.social):\nRoot post\n\n");
    }

    #[test]
    fn test_custom_template() {
        let mut root = sample();
        root.like_count = 7;
        root.created_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let options = MarkdownOptions {
            template: "{indent}{index} {handle} [{likeCount}/{replyCount}/{repostCount}] {createdAt}: {text}\n"
                .to_string(),
            ..MarkdownOptions::default()
        };

        let md = render_markdown(&root, &options);

        assert_eq!(
            md,
            "1 alice.bsky.social [7/0/0] 2024-05-01T10:00:00+00:00: Root post\n  \
             1.1 bob.bsky.social [0/0/0] : First reply\n    \
             1.1.1 carol.bsky.social [0/0/0] : Nested\n  \
             1.2 dave.bsky.social [0/0/0] : Second reply\n"
        );
    }

    #[test]
    fn test_template_fields_not_expanded_inside_text() {
        let root = ThreadNode::new("at://a/app.bsky.feed.post/1", "alice.bsky.social", "literal {handle}");
        let options = MarkdownOptions {
            template: "{depth}|{uri}|{text}|{unknown}".to_string(),
            ..MarkdownOptions::default()
        };

        assert_eq!(
            render_markdown(&root, &options),
            "0|at://a/app.bsky.feed.post/1|literal {handle}|{unknown}"
        );
    }

    #[test]
    fn test_attachment_lines() {
        let root = ThreadNode::new("at://a/app.bsky.feed.post/1", "alice.bsky.social", "Media")
            .with_attachment(Attachment {
                alt: Some("a cat".to_string()),
                ..Attachment::image("https://cdn/cat.jpg")
            })
            .with_attachment(Attachment::video("https://video/playlist.m3u8"))
            .with_attachment(Attachment {
                title: Some("Example".to_string()),
                ..Attachment::link("https://example.com")
            })
            .with_attachment(Attachment::link("https://untitled.example"));

        let md = render_markdown(&root, &MarkdownOptions::default());

        assert_eq!(
            md,
            "**alice.bsky.social** (@alice.bsky.social):\nMedia\n\n\
             ![a cat](https://cdn/cat.jpg)\n\
             [Video](https://video/playlist.m3u8)\n\
             [Example](https://example.com)\n\
             [https://untitled.example](https://untitled.example)\n\n"
        );
    }

    #[test]
    fn test_quote_renders_as_blockquote() {
        let root = ThreadNode::new("at://a/app.bsky.feed.post/1", "alice.bsky.social", "So true")
            .with_attachment(Attachment::quote(
                "at://q/app.bsky.feed.post/9",
                Some("quoted.bsky".to_string()),
                Some("line one\n\nline two".to_string()),
            ))
            .with_attachment(Attachment::quote("at://gone/app.bsky.feed.post/8", None, None));

        let md = render_markdown(&root, &MarkdownOptions::default());

        assert_eq!(
            md,
            "**alice.bsky.social** (@alice.bsky.social):\nSo true\n\n\
             > **@quoted.bsky**: line one\n\
             >\n\
             > line two\n\
             > at://gone/app.bsky.feed.post/8\n\n"
        );
    }
}
