//! Conversation memory
//!
//! Rolling summaries that replace older transcript detail.

pub mod summarizer;

pub use summarizer::{ContextSummarizer, SUMMARY_SENTINEL};
