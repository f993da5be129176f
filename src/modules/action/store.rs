use async_trait::async_trait;
use anyhow::{Result, Context};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use sqlx::postgres::PgRow;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::modules::perception::{Item, TrackedItem};

/// 按 id 的单条更新；每条更新要么整体生效要么不生效
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// 只对尚未通知的记录生效
    MarkNotified { at: DateTime<Utc> },
    Summary(String),
}

/// 以 id 为键的记录表
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn read_ids(&self) -> Result<HashSet<String>>;

    /// 已存在的 id 被忽略，返回实际写入条数
    async fn append(&self, records: Vec<TrackedItem>) -> Result<usize>;

    /// 按写入顺序返回全部记录
    async fn scan(&self) -> Result<Vec<TrackedItem>>;

    /// 返回记录是否被修改
    async fn update(&self, id: &str, update: RecordUpdate) -> Result<bool>;
}

fn apply(record: &mut TrackedItem, update: RecordUpdate) -> bool {
    match update {
        RecordUpdate::MarkNotified { at } => {
            if record.notified {
                return false;
            }
            record.notified = true;
            record.notified_at = Some(at);
            true
        }
        RecordUpdate::Summary(text) => {
            record.summary = Some(text);
            true
        }
    }
}

#[derive(Default)]
struct MemoryTable {
    records: Vec<TrackedItem>,
    index: HashMap<String, usize>,
}

/// 进程内存储，进程存活期间保持去重状态
#[derive(Default)]
pub struct MemoryItemStore {
    table: RwLock<MemoryTable>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn read_ids(&self) -> Result<HashSet<String>> {
        let table = self.table.read().await;
        Ok(table.index.keys().cloned().collect())
    }

    async fn append(&self, records: Vec<TrackedItem>) -> Result<usize> {
        let mut table = self.table.write().await;
        let mut inserted = 0;
        for record in records {
            if table.index.contains_key(record.id()) {
                continue;
            }
            let pos = table.records.len();
            table.index.insert(record.id().to_string(), pos);
            table.records.push(record);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn scan(&self) -> Result<Vec<TrackedItem>> {
        Ok(self.table.read().await.records.clone())
    }

    async fn update(&self, id: &str, update: RecordUpdate) -> Result<bool> {
        let mut table = self.table.write().await;
        let Some(&pos) = table.index.get(id) else {
            return Ok(false);
        };
        Ok(apply(&mut table.records[pos], update))
    }
}

/// PostgreSQL 存储 (表结构见 database/schema.sql)
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &PgRow) -> Result<TrackedItem> {
        Ok(TrackedItem {
            item: Item {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                link: row.try_get("link")?,
                published_at: row.try_get("published_at")?,
                description: row.try_get("description")?,
            },
            notified: row.try_get("notified")?,
            notified_at: row.try_get("notified_at")?,
            summary: row.try_get("summary")?,
        })
    }
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn read_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM feed_items")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read item ids")?;
        Ok(ids.into_iter().collect())
    }

    async fn append(&self, records: Vec<TrackedItem>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // 整批在一个事务里写入
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;
        let mut inserted = 0;
        for record in &records {
            let result = sqlx::query(
                "INSERT INTO feed_items (id, title, link, published_at, description, notified, notified_at, summary) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (id) DO NOTHING"
            )
            .bind(&record.item.id)
            .bind(&record.item.title)
            .bind(&record.item.link)
            .bind(record.item.published_at)
            .bind(&record.item.description)
            .bind(record.notified)
            .bind(record.notified_at)
            .bind(&record.summary)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert item {}", record.item.id))?;

            inserted += result.rows_affected() as usize;
        }
        tx.commit().await.context("Failed to commit appended items")?;

        Ok(inserted)
    }

    async fn scan(&self) -> Result<Vec<TrackedItem>> {
        let rows = sqlx::query(
            "SELECT id, title, link, published_at, description, notified, notified_at, summary \
             FROM feed_items ORDER BY seq"
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to scan items")?;

        rows.iter().map(Self::decode).collect()
    }

    async fn update(&self, id: &str, update: RecordUpdate) -> Result<bool> {
        let result = match update {
            RecordUpdate::MarkNotified { at } => {
                sqlx::query(
                    "UPDATE feed_items SET notified = TRUE, notified_at = $2 \
                     WHERE id = $1 AND notified = FALSE"
                )
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await
            }
            RecordUpdate::Summary(text) => {
                sqlx::query("UPDATE feed_items SET summary = $2 WHERE id = $1")
                    .bind(id)
                    .bind(text)
                    .execute(&self.pool)
                    .await
            }
        }
        .with_context(|| format!("Failed to update item {}", id))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    fn record(id: &str) -> TrackedItem {
        TrackedItem::new(Item {
            id: id.into(),
            title: format!("title {id}"),
            link: format!("https://example.com/{id}"),
            published_at: Utc::now(),
            description: String::new(),
        })
    }

    #[tokio::test]
    async fn memory_store_keeps_ids_unique_and_ordered() {
        let store = MemoryItemStore::new();
        assert_eq!(store.append(vec![record("b"), record("a")]).await.unwrap(), 2);
        assert_eq!(store.append(vec![record("a"), record("c")]).await.unwrap(), 1);

        let ids: Vec<String> = store.scan().await.unwrap().into_iter().map(|r| r.item.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(store.read_ids().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mark_notified_transitions_once() {
        let store = MemoryItemStore::new();
        store.append(vec![record("a")]).await.unwrap();

        let first = Utc::now();
        assert!(store.update("a", RecordUpdate::MarkNotified { at: first }).await.unwrap());
        assert!(!store.update("a", RecordUpdate::MarkNotified { at: Utc::now() }).await.unwrap());

        let rec = &store.scan().await.unwrap()[0];
        assert!(rec.notified);
        assert_eq!(rec.notified_at, Some(first));
    }

    #[tokio::test]
    async fn updates_to_unknown_ids_are_noops() {
        let store = MemoryItemStore::new();
        assert!(!store.update("ghost", RecordUpdate::Summary("x".into())).await.unwrap());
        assert!(store.scan().await.unwrap().is_empty());
    }

    // 需要真实 PostgreSQL：DATABASE_URL=... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn pg_store_guards_duplicates_and_renotification() {
        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let pool = crate::database::connect(&db_url).await.unwrap();
        crate::database::init_database(&pool).await.unwrap();
        let store = PgItemStore::new(pool.clone());

        let prefix = format!("pg-test-{}", Utc::now().timestamp_nanos_opt().unwrap());
        let id = |n: &str| format!("{prefix}-{n}");

        assert_eq!(store.append(vec![record(&id("a")), record(&id("b"))]).await.unwrap(), 2);
        // ON CONFLICT DO NOTHING
        assert_eq!(store.append(vec![record(&id("b")), record(&id("c"))]).await.unwrap(), 1);

        // TIMESTAMPTZ 只保留微秒
        let first = Utc::now().trunc_subsecs(0);
        assert!(store.update(&id("a"), RecordUpdate::MarkNotified { at: first }).await.unwrap());
        assert!(!store.update(&id("a"), RecordUpdate::MarkNotified { at: Utc::now() }).await.unwrap());
        assert!(store.update(&id("b"), RecordUpdate::Summary("short".into())).await.unwrap());
        assert!(!store.update(&id("ghost"), RecordUpdate::Summary("x".into())).await.unwrap());

        let mine: Vec<TrackedItem> = store
            .scan()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.item.id.starts_with(&prefix))
            .collect();
        let ids: Vec<&str> = mine.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(ids, vec![id("a"), id("b"), id("c")]);
        assert!(mine[0].notified);
        assert_eq!(mine[0].notified_at, Some(first));
        assert_eq!(mine[1].summary.as_deref(), Some("short"));
        assert!(store.read_ids().await.unwrap().contains(&id("c")));

        sqlx::query("DELETE FROM feed_items WHERE id LIKE $1")
            .bind(format!("{prefix}-%"))
            .execute(&pool)
            .await
            .unwrap();
    }
}
