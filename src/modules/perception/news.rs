// 文件名: news.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use anyhow::{Result, anyhow, Context};
use htmlescape::decode_html;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::structs::Item;

const FETCH_ATTEMPTS: u32 = 3;
const UNTITLED: &str = "(タイトルなし)";

/// Collector 接口：拉取 feed 并产出规整后的 Item
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<Item>>;
}

pub struct FeedCollector {
    client: Client,
}

impl FeedCollector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = anyhow!("Feed fetch never attempted");

        // 传输层错误重试；HTTP 状态错误直接返回
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.client.get(url).timeout(Duration::from_secs(15)).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(anyhow!("HTTP {}: failed to fetch feed {}", status, url));
                    }
                    let bytes = resp.bytes().await.context("Failed to read feed body")?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    warn!("⚠️ Feed Network Error (Attempt {}/{}): {}", attempt, FETCH_ATTEMPTS, e);
                    last_error = anyhow!("Network Error: {}", e);
                    if attempt < FETCH_ATTEMPTS {
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl FeedSource for FeedCollector {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<Item>> {
        let body = self.fetch_body(feed_url).await?;
        let items = parse_feed(&body).with_context(|| format!("Malformed feed: {}", feed_url))?;
        info!("📰 Fetched {} items from {}", items.len(), feed_url);
        Ok(items)
    }
}

/// 解析 RSS 文档；缺少 guid 和 link 的条目跳过，不作为错误上报
pub fn parse_feed(body: &[u8]) -> Result<Vec<Item>> {
    let channel = rss::Channel::read_from(body).context("RSS channel not found")?;

    let items = channel
        .items()
        .iter()
        .filter_map(|entry| {
            let link = entry.link().map(str::trim).unwrap_or_default().to_string();
            let id = entry
                .guid()
                .map(|g| g.value().trim().to_string())
                .filter(|g| !g.is_empty())
                .unwrap_or_else(|| link.clone());

            if id.is_empty() {
                warn!("Skipping feed entry without guid or link: {:?}", entry.title());
                return None;
            }

            let title = entry
                .title()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(UNTITLED)
                .to_string();

            Some(Item {
                id,
                title,
                link,
                published_at: parse_pub_date(entry.pub_date()),
                description: strip_html_tags(entry.description().unwrap_or_default()),
            })
        })
        .collect();

    Ok(items)
}

fn parse_pub_date(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Utc::now();
    };

    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        })
        .unwrap_or_else(|| {
            warn!("Unparseable pubDate '{}', using now", raw);
            Utc::now()
        })
}

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static ENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#?[A-Za-z0-9]+;").unwrap());

/// 去标签后逐个解码实体；无法识别的实体原样保留
pub fn strip_html_tags(html: &str) -> String {
    let text = TAG_PATTERN.replace_all(html, "");
    let decoded = ENTITY_PATTERN.replace_all(&text, |caps: &Captures| {
        decode_html(&caps[0]).unwrap_or_else(|_| caps[0].to_string())
    });

    decoded.replace('\u{a0}', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Social Media Today</title>
    <link>https://www.socialmediatoday.com</link>
    <description>News</description>
    <item>
      <title>Instagram adds new features</title>
      <link>https://example.com/1</link>
      <guid>guid-1</guid>
      <pubDate>Wed, 01 May 2024 09:30:00 GMT</pubDate>
      <description><![CDATA[<p>Instagram &amp; <b>Reels</b> update</p>]]></description>
    </item>
    <item>
      <title>No guid here</title>
      <link>https://example.com/2</link>
      <pubDate>Wed, 01 May 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Orphan entry</title>
      <description>neither guid nor link</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_and_skips_unidentifiable_entries() {
        let items = parse_feed(FEED.as_bytes()).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "guid-1");
        assert_eq!(items[0].description, "Instagram & Reels update");
        assert_eq!(items[0].published_at, Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap());
        assert_eq!(items[1].id, "https://example.com/2");
        assert_eq!(items[1].description, "");
    }

    #[test]
    fn rejects_documents_without_channel() {
        assert!(parse_feed(b"<html><body>nope</body></html>").is_err());
    }

    #[test]
    fn strips_tags_and_decodes_entities() {
        assert_eq!(strip_html_tags("<a href='x'>A&nbsp;&lt;B&gt;</a> &quot;c&#39;"), "A <B> \"c'");
        assert_eq!(strip_html_tags("&amp;lt;"), "&lt;");
    }

    #[test]
    fn decodes_numeric_and_named_entities() {
        assert_eq!(
            strip_html_tags("<p>Meta&#8217;s new tool &#8212; &hellip; caf&eacute;</p>"),
            "Meta\u{2019}s new tool \u{2014} \u{2026} caf\u{e9}"
        );
        assert_eq!(strip_html_tags("AT&T &#39;quoted&#39;"), "AT&T 'quoted'");
        assert_eq!(strip_html_tags("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn falls_back_through_date_formats() {
        assert_eq!(
            parse_pub_date(Some("2024-05-01T09:30:00+09:00")),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap()
        );
        assert_eq!(
            parse_pub_date(Some("2024-05-01 09:30:00")),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
        );
        let before = Utc::now();
        assert!(parse_pub_date(Some("yesterday-ish")) >= before);
    }

    #[tokio::test]
    async fn fetch_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let collector = FeedCollector::new(Client::new());
        let err = collector.fetch(&format!("{}/feed", server.uri())).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn fetch_parses_served_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let collector = FeedCollector::new(Client::new());
        let items = collector.fetch(&format!("{}/feed", server.uri())).await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
