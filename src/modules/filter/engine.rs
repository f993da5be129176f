use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::modules::perception::{FilterCriteria, Item};
use super::matcher::KeywordExpr;

/// 关键词 (OR) 与时效 (AND) 两级过滤，保持输入顺序
pub fn filter_articles<T>(items: &[T], criteria: &FilterCriteria) -> Vec<T>
where
    T: AsRef<Item> + Clone,
{
    filter_articles_at(items, criteria, Utc::now())
}

pub fn filter_articles_at<T>(items: &[T], criteria: &FilterCriteria, now: DateTime<Utc>) -> Vec<T>
where
    T: AsRef<Item> + Clone,
{
    let expressions: Vec<KeywordExpr> = criteria
        .keywords
        .iter()
        .filter_map(|k| KeywordExpr::parse(k))
        .collect();

    let mut filtered: Vec<T> = items.to_vec();

    if !expressions.is_empty() {
        filtered.retain(|entry| {
            let haystack = entry.as_ref().search_text();
            expressions.iter().any(|expr| expr.is_match(&haystack))
        });
        debug!("Keyword stage kept {}/{}", filtered.len(), items.len());
    }

    if criteria.max_age_days > 0 {
        let cutoff = now - Duration::days(criteria.max_age_days);
        filtered.retain(|entry| entry.as_ref().published_at >= cutoff);
        debug!("Recency stage (cutoff {}) kept {}", cutoff, filtered.len());
    }

    filtered
}

pub fn filter_summary(original_count: usize, filtered_count: usize, criteria: &FilterCriteria) -> String {
    let mut lines = vec![format!(
        "記事フィルタリング結果: {}件 → {}件",
        original_count, filtered_count
    )];

    // 与过滤时一致：只列出实际生效的关键词
    let active: Vec<&str> = criteria
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| KeywordExpr::parse(k).is_some())
        .collect();
    if !active.is_empty() {
        lines.push(format!("キーワード: {}", active.join(", ")));
    }

    if criteria.max_age_days > 0 {
        lines.push(format!("期間: 過去{}日以内", criteria.max_age_days));
    }

    lines.join("\n")
}
