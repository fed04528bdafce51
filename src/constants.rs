//! Shared constants used across the application.

/// User agent string sent with every outbound HTTP request.
pub const USER_AGENT: &str = concat!("bsky2llm/", env!("CARGO_PKG_VERSION"));

/// Public, unauthenticated Bluesky AppView endpoint.
pub const BSKY_PUBLIC_API: &str = "https://public.api.bsky.app/xrpc";

/// Default base URL for the OpenAI-compatible chat and transcription API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com";

/// Prefix of the text part that carries a video transcript.
pub const TRANSCRIPT_MARKER: &str = "[Transcript] ";

/// Text part emitted in place of a video that could not be processed.
pub const VIDEO_FAILED_PLACEHOLDER: &str = "[Video could not be processed]";

/// Prefix of the text part emitted for a video when processing is disabled.
pub const VIDEO_SKIPPED_MARKER: &str = "[Video] ";

/// Prefix of the text part emitted for an external link card.
pub const LINK_MARKER: &str = "[Link] ";

/// Prefix of the text part emitted for a quoted post.
pub const QUOTE_MARKER: &str = "[Quote] ";

/// Sentences appended to the system message when structured output is requested.
pub const JSON_MODE_INSTRUCTION: &str = "You provide responses in JSON format.";
pub const JSON_SCHEMA_INSTRUCTION: &str = "Please provide a response using this JSON structure:";
