use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::modules::perception::{Item, TrackedItem};
use super::store::{ItemStore, RecordUpdate};

/// 通知状态跟踪：去重写入、查询未通知、标记已通知
pub struct NotificationTracker {
    store: Arc<dyn ItemStore>,
}

impl NotificationTracker {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// 只写入库中没有的 id；同一批次内重复的 id 取第一条
    pub async fn ingest(&self, items: &[Item]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut seen = self.store.read_ids().await?;
        let fresh: Vec<TrackedItem> = items
            .iter()
            .filter(|item| seen.insert(item.id.clone()))
            .cloned()
            .map(TrackedItem::new)
            .collect();

        if fresh.is_empty() {
            info!("No new items to store");
            return Ok(0);
        }

        let inserted = self.store.append(fresh).await?;
        info!("💾 Stored {} new items", inserted);
        Ok(inserted)
    }

    pub async fn unnotified(&self) -> Result<Vec<TrackedItem>> {
        let records = self.store.scan().await?;
        Ok(records.into_iter().filter(|r| !r.notified).collect())
    }

    /// 未知 id 忽略；返回实际标记条数
    pub async fn mark_notified<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let now = Utc::now();
        let wanted: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();

        let mut updated = 0;
        for id in wanted {
            if self.store.update(id, RecordUpdate::MarkNotified { at: now }).await? {
                updated += 1;
            }
        }

        info!("✅ Marked {} items as notified", updated);
        Ok(updated)
    }

    pub async fn save_summary(&self, id: &str, text: &str) -> Result<bool> {
        self.store.update(id, RecordUpdate::Summary(text.to_string())).await
    }

    pub async fn total_count(&self) -> Result<usize> {
        Ok(self.store.read_ids().await?.len())
    }

    pub async fn notified_count(&self) -> Result<usize> {
        Ok(self.store.scan().await?.iter().filter(|r| r.notified).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::action::store::MemoryItemStore;

    fn item(id: &str) -> Item {
        Item {
            id: id.into(),
            title: format!("title {id}"),
            link: format!("https://example.com/{id}"),
            published_at: Utc::now(),
            description: format!("description {id}"),
        }
    }

    fn tracker() -> NotificationTracker {
        NotificationTracker::new(Arc::new(MemoryItemStore::new()))
    }

    #[tokio::test]
    async fn ingest_is_idempotent() {
        let tracker = tracker();
        let batch = vec![item("1"), item("2"), item("3")];

        assert_eq!(tracker.ingest(&batch).await.unwrap(), 3);
        assert_eq!(tracker.ingest(&batch).await.unwrap(), 0);
        assert_eq!(tracker.total_count().await.unwrap(), 3);

        let overlap = vec![item("3"), item("4")];
        assert_eq!(tracker.ingest(&overlap).await.unwrap(), 1);
        assert_eq!(tracker.total_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn ingest_dedups_within_batch() {
        let tracker = tracker();
        let mut dup = item("1");
        dup.title = "second copy".into();

        assert_eq!(tracker.ingest(&[item("1"), dup]).await.unwrap(), 1);
        assert_eq!(tracker.unnotified().await.unwrap()[0].item.title, "title 1");
    }

    #[tokio::test]
    async fn unnotified_excludes_marked_records() {
        let tracker = tracker();
        tracker.ingest(&[item("1"), item("2"), item("3")]).await.unwrap();

        assert_eq!(tracker.mark_notified(&["2"]).await.unwrap(), 1);

        let pending: Vec<String> = tracker.unnotified().await.unwrap().into_iter().map(|r| r.item.id).collect();
        assert_eq!(pending, vec!["1", "3"]);
        assert_eq!(tracker.notified_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_notified_tolerates_unknown_ids() {
        let tracker = tracker();
        tracker.ingest(&[item("1")]).await.unwrap();

        assert_eq!(tracker.mark_notified(&["missing", "1", "1"]).await.unwrap(), 1);
        assert_eq!(tracker.mark_notified(&["missing"]).await.unwrap(), 0);
        assert!(tracker.unnotified().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_round_trips_through_unnotified() {
        let tracker = tracker();
        tracker.ingest(&[item("1")]).await.unwrap();

        assert!(tracker.save_summary("1", "short").await.unwrap());
        assert!(!tracker.save_summary("nope", "short").await.unwrap());
        assert_eq!(tracker.unnotified().await.unwrap()[0].summary.as_deref(), Some("short"));
    }
}
