pub mod store;
pub mod tracker;

pub use store::{ItemStore, MemoryItemStore, PgItemStore, RecordUpdate};
pub use tracker::NotificationTracker;
