use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bsky2llm::bluesky::{BlueskyClient, FetchedThread, ThreadFetcher};
use bsky2llm::compose::{ComposeConfig, Traversal};
use bsky2llm::config::Config;
use bsky2llm::llm::{OpenAiClient, ResponseFormat};
use bsky2llm::markdown::{render_markdown, MarkdownOptions, DEFAULT_TEMPLATE};
use bsky2llm::pipeline::{save_thread, Pipeline, RunOptions, Scope};
use bsky2llm::thread::ThreadNode;
use bsky2llm::video::MediaToolsProcessor;

/// Convert Bluesky threads into LLM conversations.
#[derive(Parser)]
#[command(name = "bsky2llm")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// How the thread is turned into chat messages.
#[derive(Args)]
struct ComposeArgs {
    /// Posts by this handle become assistant turns
    #[arg(long)]
    assistant_handle: Option<String>,

    /// System message placed before the thread
    #[arg(long = "system")]
    system_preamble: Option<String>,

    /// Which posts become messages
    #[arg(long, value_enum, default_value_t = ScopeArg::Path)]
    scope: ScopeArg,

    /// Reference videos by URL instead of downloading them
    #[arg(long)]
    no_video: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized thread as JSON
    Thread {
        /// Post URL or at:// URI
        post: String,

        /// Start the tree at the requested post instead of the conversation root
        #[arg(long)]
        no_root: bool,

        /// Also write thread_<rkey>.json and thread_<rkey>.md here
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the thread as markdown
    Markdown {
        /// Post URL or at:// URI
        post: String,

        /// Prefix posts with hierarchical indices (1.2.1)
        #[arg(long)]
        indices: bool,

        /// Deepest reply level to include
        #[arg(long)]
        max_depth: Option<usize>,

        /// Only render the root post
        #[arg(long)]
        no_replies: bool,

        /// Per-post template with {displayName}, {handle}, {text}, {index}, {indent},
        /// {depth}, {createdAt}, {likeCount}, {replyCount}, {repostCount} and {uri};
        /// a literal \n becomes a newline
        #[arg(long)]
        format: Option<String>,
    },

    /// Print the composed chat messages as JSON
    Messages {
        /// Post URL or at:// URI; with --from-json, the target post URI
        post: Option<String>,

        /// Read a saved thread instead of fetching
        #[arg(long)]
        from_json: Option<PathBuf>,

        #[command(flatten)]
        compose: ComposeArgs,
    },

    /// Send the thread to the model and print the reply
    Ask {
        /// Post URL or at:// URI
        post: String,

        /// Request a JSON object reply
        #[arg(long)]
        structured: bool,

        /// JSON schema file describing the reply (implies --structured)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Also write thread_<rkey>.json and thread_<rkey>.md here
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        compose: ComposeArgs,
    },

    /// Convert between bsky.app URLs and at:// URIs
    Resolve {
        /// Post URL or at:// URI
        input: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    /// Root down to the requested post
    Path,
    /// Every post in the thread
    Full,
    /// Root, then the first reply at each level
    FirstBranch,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Path => Self::Path,
            ScopeArg::Full => Self::Full,
            ScopeArg::FirstBranch => Self::FirstBranch,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let bluesky = BlueskyClient::from_config(&config)?;

    match cli.command {
        Commands::Resolve { ref input } => {
            let at_uri = bluesky.to_at_uri(input).await?;
            let web_url = bluesky.to_web_url(&at_uri).await?;
            println!("{at_uri}\n{web_url}");
        }
        Commands::Thread {
            ref post,
            no_root,
            ref output_dir,
        } => {
            let bluesky = if no_root { bluesky.without_root() } else { bluesky };
            let thread = bluesky.fetch(post).await?;
            if let Some(dir) = output_dir {
                save_thread(&thread, dir).await?;
            }
            println!("{}", serde_json::to_string_pretty(&thread.root)?);
        }
        Commands::Markdown {
            ref post,
            indices,
            max_depth,
            no_replies,
            ref format,
        } => {
            let thread = bluesky.fetch(post).await?;
            let options = MarkdownOptions {
                include_replies: !no_replies,
                max_depth,
                include_indices: indices,
                template: markdown_template(format.as_deref()),
            };
            print!("{}", render_markdown(&thread.root, &options));
        }
        Commands::Messages {
            ref post,
            ref from_json,
            ref compose,
        } => {
            let pipeline = build_pipeline(compose, &config, bluesky)?;
            let mut scope = Scope::from(compose.scope);
            let thread = match (from_json, post) {
                (Some(path), target) => {
                    let json = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let root: ThreadNode =
                        serde_json::from_str(&json).context("Failed to parse saved thread")?;
                    if target.is_none() && scope == Scope::Path {
                        scope = Scope::Full;
                    }
                    FetchedThread {
                        requested_uri: target.clone().unwrap_or_else(|| root.uri.clone()),
                        root,
                    }
                }
                (None, Some(post)) => pipeline.fetch(post).await?,
                (None, None) => anyhow::bail!("either a post or --from-json is required"),
            };
            let messages = pipeline.messages_for(&thread, scope).await?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        Commands::Ask {
            ref post,
            structured,
            ref schema,
            ref output_dir,
            ref compose,
        } => {
            let format = match schema {
                Some(path) => {
                    let json = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read schema {}", path.display()))?;
                    ResponseFormat::Json {
                        schema: Some(serde_json::from_str(&json).context("Schema is not valid JSON")?),
                    }
                }
                None if structured => ResponseFormat::Json { schema: None },
                None => ResponseFormat::Text,
            };
            let model = OpenAiClient::from_config(&config)?;
            let pipeline = build_pipeline(compose, &config, bluesky)?.with_model(Arc::new(model));

            let options = RunOptions {
                scope: compose.scope.into(),
                format,
                output_dir: output_dir.clone(),
            };
            let response = pipeline.run(post, &options).await?;
            println!("{}", response.render());
        }
    }

    Ok(())
}

fn build_pipeline(args: &ComposeArgs, config: &Config, bluesky: BlueskyClient) -> Result<Pipeline> {
    let mut compose = ComposeConfig::new(Traversal::FullTree);
    compose.assistant_handle = args
        .assistant_handle
        .clone()
        .or_else(|| config.assistant_handle.clone());
    compose.system_preamble = args
        .system_preamble
        .clone()
        .or_else(|| config.system_preamble.clone());
    compose.process_videos = config.process_videos && !args.no_video;

    info!(
        assistant_handle = ?compose.assistant_handle,
        process_videos = compose.process_videos,
        "Pipeline configured"
    );

    let videos = MediaToolsProcessor::from_config(config)?;
    Ok(Pipeline::new(Arc::new(bluesky), Arc::new(videos), compose))
}

/// `--format` value with literal `\n` sequences turned into newlines, or the default layout.
fn markdown_template(format: Option<&str>) -> String {
    format.map_or_else(|| DEFAULT_TEMPLATE.to_string(), |f| f.replace("\\n", "\n"))
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "info,bsky2llm=debug"
    } else {
        "warn,bsky2llm=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // stdout carries command output, so logs go to stderr
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
