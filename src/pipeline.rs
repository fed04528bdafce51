//! Fetch → compose → model, with optional artifacts on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::bluesky::{FetchedThread, ThreadFetcher};
use crate::compose::{compose, ComposeConfig, Traversal};
use crate::error::{Error, Result};
use crate::llm::{ModelCaller, ModelResponse, ResponseFormat};
use crate::markdown::{render_markdown, MarkdownOptions};
use crate::message::Message;
use crate::video::VideoProcessor;

/// Which posts of the fetched thread become messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    /// Root down to the requested post.
    #[default]
    Path,
    /// Every post, depth-first.
    Full,
    /// Root, then the first reply at each level.
    FirstBranch,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scope: Scope,
    pub format: ResponseFormat,
    /// Directory for `thread_<rkey>.json` and `thread_<rkey>.md`.
    pub output_dir: Option<PathBuf>,
}

pub struct Pipeline {
    fetcher: Arc<dyn ThreadFetcher>,
    videos: Arc<dyn VideoProcessor>,
    model: Option<Arc<dyn ModelCaller>>,
    compose: ComposeConfig,
}

impl Pipeline {
    /// `compose.traversal` is replaced per call according to [`Scope`].
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn ThreadFetcher>,
        videos: Arc<dyn VideoProcessor>,
        compose: ComposeConfig,
    ) -> Self {
        Self {
            fetcher,
            videos,
            model: None,
            compose,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ModelCaller>) -> Self {
        self.model = Some(model);
        self
    }

    /// # Errors
    ///
    /// Propagates fetcher errors.
    pub async fn fetch(&self, post_id: &str) -> Result<FetchedThread> {
        self.fetcher.fetch(post_id).await
    }

    /// Compose messages for an already fetched thread.
    ///
    /// # Errors
    ///
    /// Propagates composition errors.
    pub async fn messages_for(&self, thread: &FetchedThread, scope: Scope) -> Result<Vec<Message>> {
        let (traversal, target) = match scope {
            Scope::Path => (Traversal::FullTree, Some(thread.requested_uri.as_str())),
            Scope::Full => (Traversal::FullTree, None),
            Scope::FirstBranch => (Traversal::FirstBranch, None),
        };
        let config = ComposeConfig {
            traversal,
            ..self.compose.clone()
        };
        compose(&thread.root, target, &config, self.videos.as_ref()).await
    }

    /// Fetch a thread and compose its messages.
    ///
    /// # Errors
    ///
    /// Propagates fetcher and composition errors.
    pub async fn messages(&self, post_id: &str, scope: Scope) -> Result<Vec<Message>> {
        let thread = self.fetch(post_id).await?;
        self.messages_for(&thread, scope).await
    }

    /// Fetch, compose and send to the model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no model is attached, otherwise
    /// propagates errors from each stage.
    pub async fn run(&self, post_id: &str, options: &RunOptions) -> Result<ModelResponse> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::Config("no model configured".to_string()))?;

        let thread = self.fetch(post_id).await?;
        if let Some(dir) = &options.output_dir {
            save_thread(&thread, dir).await?;
        }

        let messages = self.messages_for(&thread, options.scope).await?;
        info!(
            post = %thread.requested_uri,
            messages = messages.len(),
            "Sending thread to model"
        );
        model.call(&messages, &options.format).await
    }
}

/// Write the normalized thread as JSON and markdown into `dir`.
///
/// Files are named after the root post's record key, so every post of one
/// conversation maps to the same pair of files.
///
/// # Errors
///
/// Returns an error if the directory or files cannot be written.
pub async fn save_thread(thread: &FetchedThread, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir).await?;

    let rkey = thread.root.rkey();
    let json_path = dir.join(format!("thread_{rkey}.json"));
    let md_path = dir.join(format!("thread_{rkey}.md"));

    let json = serde_json::to_string_pretty(&thread.root)?;
    tokio::fs::write(&json_path, json).await?;

    let markdown = render_markdown(
        &thread.root,
        &MarkdownOptions {
            include_indices: true,
            ..MarkdownOptions::default()
        },
    );
    tokio::fs::write(&md_path, markdown).await?;

    info!(
        json = %json_path.display(),
        markdown = %md_path.display(),
        "Saved thread"
    );
    Ok((json_path, md_path))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::message::{MessageContent, Role};
    use crate::thread::ThreadNode;
    use crate::video::VideoResult;

    struct StubFetcher {
        thread: FetchedThread,
    }

    #[async_trait]
    impl ThreadFetcher for StubFetcher {
        async fn fetch(&self, post_id: &str) -> Result<FetchedThread> {
            if post_id == "missing" {
                return Err(Error::NotFound(post_id.to_string()));
            }
            Ok(self.thread.clone())
        }
    }

    struct NoVideos;

    #[async_trait]
    impl VideoProcessor for NoVideos {
        async fn process(&self, video_url: &str) -> Result<VideoResult> {
            Err(Error::Processing(video_url.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl ModelCaller for RecordingModel {
        async fn call(&self, messages: &[Message], format: &ResponseFormat) -> Result<ModelResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(match format {
                ResponseFormat::Text => ModelResponse::Text("ok".to_string()),
                ResponseFormat::Json { .. } => ModelResponse::Structured(serde_json::json!({"ok": true})),
            })
        }
    }

    fn thread() -> FetchedThread {
        let root = ThreadNode::new("at://op/app.bsky.feed.post/1", "op.bsky.social", "Question?")
            .with_reply(
                ThreadNode::new("at://a/app.bsky.feed.post/2", "a.bsky.social", "Answer A")
                    .with_reply(ThreadNode::new(
                        "at://b/app.bsky.feed.post/4",
                        "b.bsky.social",
                        "Follow-up",
                    )),
            )
            .with_reply(ThreadNode::new(
                "at://c/app.bsky.feed.post/3",
                "c.bsky.social",
                "Answer C",
            ));
        FetchedThread {
            root,
            requested_uri: "at://b/app.bsky.feed.post/4".to_string(),
        }
    }

    fn pipeline(model: Arc<RecordingModel>) -> Pipeline {
        Pipeline::new(
            Arc::new(StubFetcher { thread: thread() }),
            Arc::new(NoVideos),
            ComposeConfig::new(Traversal::FullTree).with_system_preamble("Reply helpfully."),
        )
        .with_model(model)
    }

    fn texts(messages: &[Message]) -> Vec<&str> {
        messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text(text) => text.as_str(),
                MessageContent::Parts(_) => "<parts>",
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scopes_select_posts() {
        let pipeline = pipeline(Arc::new(RecordingModel::default()));

        let path = pipeline.messages("x", Scope::Path).await.unwrap();
        assert_eq!(
            texts(&path),
            vec!["Reply helpfully.", "Question?", "Answer A", "Follow-up"]
        );

        let full = pipeline.messages("x", Scope::Full).await.unwrap();
        assert_eq!(full.len(), 5);
        assert_eq!(texts(&full)[4], "Answer C");

        let first = pipeline.messages("x", Scope::FirstBranch).await.unwrap();
        assert_eq!(
            texts(&first),
            vec!["Reply helpfully.", "Question?", "Answer A", "Follow-up"]
        );
        assert_eq!(first[1].role, Role::Assistant);
        assert_eq!(first[2].role, Role::User);
    }

    #[tokio::test]
    async fn test_run_sends_composed_messages() {
        let model = Arc::new(RecordingModel::default());
        let pipeline = pipeline(model.clone());

        let response = pipeline
            .run(
                "x",
                &RunOptions {
                    format: ResponseFormat::Json { schema: None },
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(response, ModelResponse::Structured(serde_json::json!({"ok": true})));
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 4);
    }

    #[tokio::test]
    async fn test_run_without_model_is_config_error() {
        let pipeline = Pipeline::new(
            Arc::new(StubFetcher { thread: thread() }),
            Arc::new(NoVideos),
            ComposeConfig::new(Traversal::FullTree),
        );
        let result = pipeline.run("x", &RunOptions::default()).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_errors_propagate() {
        let model = Arc::new(RecordingModel::default());
        let pipeline = pipeline(model.clone());

        let result = pipeline.run("missing", &RunOptions::default()).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_saves_artifacts_named_after_root() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(Arc::new(RecordingModel::default()));

        pipeline
            .run(
                "x",
                &RunOptions {
                    output_dir: Some(dir.path().join("out")),
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap();

        assert!(!dir.path().join("out/thread_4.json").exists());
        let json = std::fs::read_to_string(dir.path().join("out/thread_1.json")).unwrap();
        let saved: ThreadNode = serde_json::from_str(&json).unwrap();
        assert_eq!(saved, thread().root);

        let md = std::fs::read_to_string(dir.path().join("out/thread_1.md")).unwrap();
        assert!(md.starts_with("[1] **op.bsky.social** (@op.bsky.social):\nQuestion?"));
        assert!(md.contains("[1.1.1] **b.bsky.social**"));
    }
}
