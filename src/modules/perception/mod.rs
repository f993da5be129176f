pub mod structs;
pub mod text_serializer;
pub mod news;

pub use structs::{FilterCriteria, Item, TrackedItem};
pub use news::{FeedCollector, FeedSource};
