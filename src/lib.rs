//! Turn Bluesky threads into chat-completion conversations.
//!
//! A thread is fetched from the public AppView, normalized into a
//! [`thread::ThreadNode`] tree, composed into role-tagged
//! [`message::Message`]s (with video frames and transcripts inlined), and
//! optionally sent to an OpenAI-compatible model.

pub mod bluesky;
pub mod compose;
pub mod config;
pub mod constants;
pub mod error;
pub mod llm;
pub mod markdown;
pub mod message;
pub mod pipeline;
pub mod thread;
pub mod video;

pub use error::{Error, Result};
