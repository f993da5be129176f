pub mod summarizer;
pub mod llm;

pub use summarizer::{Summarizer, TruncatingSummarizer};
pub use llm::LlmSummarizer;
