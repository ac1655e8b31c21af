//! Generation and summarization collaborators.
//!
//! The [`LlmClient`] speaks an OpenAI-compatible chat-completions API with a
//! bounded per-request timeout and a single fixed-backoff retry on transient
//! failures (rate limit or 5xx). The [`Summarizer`] layers the article,
//! section-digest and reply-condensation prompts on top of it; its callers
//! always degrade to a non-LLM fallback when it fails.

pub mod client;
pub mod summarizer;

pub use client::LlmClient;
pub use client::LlmMessage;
pub use summarizer::BatchReport;
pub use summarizer::Summarizer;
