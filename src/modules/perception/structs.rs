use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条 feed 条目。`id` 取 guid，没有 guid 时退回 link，是全局去重键。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub description: String,
}

impl Item {
    /// 关键词匹配用的检索文本 (title + " " + description，已小写)
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }
}

impl AsRef<Item> for Item {
    fn as_ref(&self) -> &Item {
        self
    }
}

/// 持久化形态：Item + 通知生命周期字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    #[serde(flatten)]
    pub item: Item,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

impl TrackedItem {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            notified: false,
            notified_at: None,
            summary: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }
}

impl AsRef<Item> for TrackedItem {
    fn as_ref(&self) -> &Item {
        &self.item
    }
}

impl From<Item> for TrackedItem {
    fn from(item: Item) -> Self {
        TrackedItem::new(item)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// 空列表 = 不做关键词过滤
    pub keywords: Vec<String>,
    /// <= 0 = 不做时效过滤
    pub max_age_days: i64,
}

impl FilterCriteria {
    pub fn new(keywords: Vec<String>, max_age_days: i64) -> Self {
        Self { keywords, max_age_days }
    }
}
