use async_trait::async_trait;
use std::collections::HashMap;
use unicode_segmentation::UnicodeSegmentation;

use crate::modules::perception::Item;

pub const ELLIPSIS: &str = "...";
const SENTENCE_END: &str = "。";
// 切点至少落在 max_length 的 70% 处
const MIN_CUT_RATIO: f64 = 0.7;

/// 摘要能力接口。实现方自行吞掉后端错误，调用方只拿到文本。
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, item: &Item, max_length: usize) -> String;

    /// 日志用名称
    fn name(&self) -> &'static str;
}

/// 规则摘要：按句号 / 空格截断描述文本
#[derive(Debug, Default, Clone, Copy)]
pub struct TruncatingSummarizer;

impl TruncatingSummarizer {
    pub fn new() -> Self {
        Self
    }

    pub fn summarize_item(&self, item: &Item, max_length: usize) -> String {
        truncate_text(&item.description, max_length)
    }

    /// 后出现的重复 id 覆盖先出现的
    pub fn summarize_batch<T: AsRef<Item>>(&self, items: &[T], max_length: usize) -> HashMap<String, String> {
        items
            .iter()
            .map(|entry| {
                let item = entry.as_ref();
                (item.id.clone(), self.summarize_item(item, max_length))
            })
            .collect()
    }
}

#[async_trait]
impl Summarizer for TruncatingSummarizer {
    async fn summarize(&self, item: &Item, max_length: usize) -> String {
        self.summarize_item(item, max_length)
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// 折叠所有空白 (含换行) 为单个空格并去掉首尾空白
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 长度单位是字素簇 (用户可见字符)，上限和切点都不会拆开组合字符
pub fn truncate_text(text: &str, max_length: usize) -> String {
    let cleaned = normalize_whitespace(text);
    if cleaned.is_empty() {
        return cleaned;
    }

    let graphemes: Vec<&str> = cleaned.graphemes(true).collect();
    if graphemes.len() <= max_length {
        return cleaned;
    }

    let candidate = &graphemes[..max_length];
    let threshold = max_length as f64 * MIN_CUT_RATIO;
    let acceptable = |pos: usize| pos as f64 >= threshold;

    // a. 全角句号
    if let Some(pos) = candidate.iter().rposition(|&g| g == SENTENCE_END).filter(|&p| acceptable(p)) {
        return candidate[..=pos].concat();
    }

    // b. ". "
    if let Some(pos) = candidate
        .windows(2)
        .rposition(|w| w[0] == "." && w[1] == " ")
        .filter(|&p| acceptable(p))
    {
        return candidate[..=pos].concat();
    }

    // c. 空格
    if let Some(pos) = candidate.iter().rposition(|&g| g == " ").filter(|&p| acceptable(p)) {
        return candidate[..pos].concat() + ELLIPSIS;
    }

    // d. 硬截断
    candidate.concat() + ELLIPSIS
}
