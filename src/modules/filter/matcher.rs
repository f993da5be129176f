use regex::{Regex, RegexBuilder};
use tracing::warn;

const BOUNDARY_MARKER: &str = r"\b";

/// 编译后的关键词表达式
///
/// `\bX\b` 形式按单词边界匹配 (大小写不敏感)，其余一律按子串匹配。
/// 子串模式下单字符关键词 (如 `x`) 也会命中 `experience` 之类的长词。
#[derive(Debug, Clone)]
pub enum KeywordExpr {
    Substring(String),
    WordBoundary(Regex),
}

impl KeywordExpr {
    /// 空白表达式 (trim 后为空，或 `\b\b`) 返回 None
    pub fn parse(expression: &str) -> Option<Self> {
        let expression = expression.trim();

        if let Some(inner) = boundary_inner(expression) {
            if inner.is_empty() {
                return None;
            }
            // 保留原始大小写，交给 (?i) 处理
            let pattern = format!(r"\b{}\b", regex::escape(inner));
            return match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(re) => Some(KeywordExpr::WordBoundary(re)),
                Err(e) => {
                    warn!("⚠️ Boundary keyword '{}' rejected ({}), using substring match", inner, e);
                    Some(KeywordExpr::Substring(inner.to_lowercase()))
                }
            };
        }

        if expression.is_empty() {
            return None;
        }
        Some(KeywordExpr::Substring(expression.to_lowercase()))
    }

    /// `haystack` 需已小写
    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            KeywordExpr::Substring(needle) => haystack.contains(needle.as_str()),
            KeywordExpr::WordBoundary(re) => re.is_match(haystack),
        }
    }
}

fn boundary_inner(expression: &str) -> Option<&str> {
    if expression.len() < BOUNDARY_MARKER.len() * 2 {
        return None;
    }
    expression
        .strip_prefix(BOUNDARY_MARKER)
        .and_then(|rest| rest.strip_suffix(BOUNDARY_MARKER))
}

/// 单次判断；批量过滤请先 `KeywordExpr::parse` 再复用
pub fn matches(haystack_lowercased: &str, keyword_expression: &str) -> bool {
    KeywordExpr::parse(keyword_expression)
        .map(|expr| expr.is_match(haystack_lowercased))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_expression_requires_whole_word() {
        let kw = r"\bX\b";
        assert!(matches("x platform updates features", kw));
        assert!(matches("a post on x went viral", kw));
        assert!(!matches("experience the new design", kw));
        assert!(!matches("explore marketing tools", kw));
    }

    #[test]
    fn plain_single_char_matches_inside_words() {
        for text in ["x platform", "post on x", "experience", "explore"] {
            assert!(matches(text, "x"), "{text}");
        }
    }

    #[test]
    fn substring_is_case_insensitive_and_phrase_aware() {
        assert!(matches("new social media tools", "Social Media"));
        assert!(!matches("social and media", "social media"));
        assert!(matches("instagram", "  INSTAGRAM "));
    }

    #[test]
    fn boundary_text_is_escaped() {
        // `+` 后面没有单词边界
        assert!(!matches("we love c++ today", r"\bc++\b"));
        assert!(matches("version 1.5 released", r"\b1.5\b"));
        assert!(!matches("version 105 released", r"\b1.5\b"));
    }

    #[test]
    fn blank_expressions_never_match() {
        assert!(KeywordExpr::parse("   ").is_none());
        assert!(KeywordExpr::parse(r"\b\b").is_none());
        assert!(!matches("anything", ""));
    }

    #[test]
    fn lone_marker_is_plain_substring() {
        // `\b` 单独出现不构成边界表达式
        assert!(matches(r"path\b", r"\b"));
    }
}
