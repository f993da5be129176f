pub mod matcher;
pub mod engine;

pub use matcher::{matches, KeywordExpr};
pub use engine::{filter_articles, filter_articles_at, filter_summary};
