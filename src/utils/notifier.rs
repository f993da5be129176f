use async_trait::async_trait;
use anyhow::{Result, anyhow, Context};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Local, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, warn};
use unicode_segmentation::UnicodeSegmentation;
use url::form_urlencoded;

use crate::modules::perception::TrackedItem;

const DESCRIPTION_PREVIEW_CHARS: usize = 300;
const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/";

/// 一条待推送的文章消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleMessage {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub description: String,
}

impl From<&TrackedItem> for ArticleMessage {
    fn from(record: &TrackedItem) -> Self {
        Self {
            title: record.item.title.clone(),
            link: record.item.link.clone(),
            published_at: record.item.published_at,
            summary: record.summary.clone().filter(|s| !s.is_empty()),
            description: record.item.description.clone(),
        }
    }
}

impl ArticleMessage {
    fn formatted_date(&self) -> String {
        self.published_at.with_timezone(&Local).format("%Y/%m/%d %H:%M").to_string()
    }

    /// 有摘要用摘要，否则截取描述
    fn body(&self) -> Option<(&'static str, String)> {
        if let Some(summary) = &self.summary {
            return Some(("要約", summary.clone()));
        }
        if !self.description.is_empty() {
            return Some(("説明", clip(&self.description, DESCRIPTION_PREVIEW_CHARS)));
        }
        None
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= max_chars {
        return text.to_string();
    }
    graphemes[..max_chars].concat() + "..."
}

/// 聊天渠道。文章推送失败必须返回错误；错误告警和运行汇总只记日志。
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_article(&self, message: &ArticleMessage) -> Result<()>;

    async fn send_text(&self, title: &str, text: &str) -> Result<()>;

    fn name(&self) -> &'static str;

    async fn send_error_message(&self, text: &str) {
        if let Err(e) = self.send_text("🚨 RSS通知システムエラー", text).await {
            error!("❌ Failed to deliver error report via {}: {}", self.name(), e);
        }
    }

    async fn send_run_summary(&self, fetched: usize, filtered: usize, notified: usize) {
        let text = format!(
            "📊 RSS通知実行結果\n\n• 取得記事数: {}件\n• フィルタ後: {}件\n• 通知済み: {}件",
            fetched, filtered, notified
        );
        if let Err(e) = self.send_text("RSS通知実行完了", &text).await {
            error!("❌ Failed to deliver run summary via {}: {}", self.name(), e);
        }
    }
}

// ----------------------------------------------------------------------------
// Slack Incoming Webhook
// ----------------------------------------------------------------------------

pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(client: Client, webhook_url: String) -> Self {
        Self { client, webhook_url }
    }

    pub fn validate_webhook_url(&self) -> bool {
        self.webhook_url.starts_with(SLACK_WEBHOOK_PREFIX)
    }

    pub fn build_article_payload(message: &ArticleMessage) -> Value {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {"type": "plain_text", "text": "📰 新着ニュース", "emoji": true}
            }),
            json!({
                "type": "section",
                "text": {"type": "mrkdwn", "text": format!("*<{}|{}>*", message.link, message.title)}
            }),
            json!({
                "type": "context",
                "elements": [{"type": "mrkdwn", "text": format!("📅 {}", message.formatted_date())}]
            }),
        ];

        if let Some((label, body)) = message.body() {
            blocks.push(json!({
                "type": "section",
                "text": {"type": "mrkdwn", "text": format!("*{}:*\n{}", label, body)}
            }));
        }

        blocks.push(json!({"type": "divider"}));

        json!({
            "text": format!("新着ニュース: {}", message.title),
            "blocks": blocks,
        })
    }

    async fn post(&self, body: &Value) -> Result<()> {
        if self.webhook_url.is_empty() {
            return Err(anyhow!("Slack webhook URL is not configured"));
        }

        let resp = self.client.post(&self.webhook_url)
            .json(body)
            .send()
            .await
            .context("Slack network error")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Slack API returned status {}: {}", status, text));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for SlackNotifier {
    async fn send_article(&self, message: &ArticleMessage) -> Result<()> {
        self.post(&Self::build_article_payload(message)).await
    }

    async fn send_text(&self, title: &str, text: &str) -> Result<()> {
        let body = json!({
            "text": title,
            "blocks": [
                {"type": "header", "text": {"type": "plain_text", "text": title, "emoji": true}},
                {"type": "section", "text": {"type": "mrkdwn", "text": text}},
                {"type": "divider"}
            ]
        });
        self.post(&body).await
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

// ----------------------------------------------------------------------------
// DingTalk 自定义机器人
// ----------------------------------------------------------------------------

pub struct DingTalkNotifier {
    client: Client,
    webhook_url: String,
    secret: String,
    keyword: String,
}

impl DingTalkNotifier {
    pub fn new(client: Client, webhook_url: String, secret: String, keyword: String) -> Self {
        Self { client, webhook_url, secret, keyword }
    }

    fn get_signed_url(&self) -> Result<String> {
        if self.secret.is_empty() {
            return Ok(self.webhook_url.clone());
        }

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign(&self.secret, &timestamp)?;
        let encoded_val: String = form_urlencoded::byte_serialize(signature.as_bytes()).collect();

        let sep = if self.webhook_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}timestamp={}&sign={}", self.webhook_url, sep, timestamp, encoded_val))
    }

    fn attach_keyword(&self, content: &str) -> String {
        if self.keyword.is_empty() || content.contains(&self.keyword) {
            return content.to_string();
        }
        format!("{}\n\n[{}]", content, self.keyword)
    }

    pub fn build_article_markdown(message: &ArticleMessage) -> String {
        let mut text = format!(
            "### 📰 新着ニュース\n\n**[{}]({})**\n\n📅 {}\n",
            message.title, message.link, message.formatted_date()
        );
        if let Some((label, body)) = message.body() {
            text.push_str(&format!("\n---\n**{}**:\n> {}\n", label, body));
        }
        text
    }

    async fn send_markdown_raw(&self, title: &str, text: &str) -> Result<()> {
        if self.webhook_url.is_empty() {
            return Err(anyhow!("DingTalk webhook URL is not configured"));
        }

        let body = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": title,
                "text": self.attach_keyword(text)
            }
        });

        let url = self.get_signed_url()?;
        let resp = self.client.post(&url).json(&body).send().await.context("DingTalk network error")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read DingTalk response body")?;

        if !status.is_success() {
            return Err(anyhow!("DingTalk returned status {}: {}", status, text));
        }
        // HTTP 200 也可能带业务错误码
        let errcode = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["errcode"].as_i64())
            .unwrap_or(0);
        if errcode != 0 {
            warn!("❌ DingTalk Error: {}", text);
            return Err(anyhow!("DingTalk errcode {}: {}", errcode, text));
        }
        Ok(())
    }
}

fn sign(secret: &str, timestamp: &str) -> Result<String> {
    let string_to_sign = format!("{}\n{}", timestamp, secret);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid DingTalk secret: {}", e))?;
    mac.update(string_to_sign.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl NotificationSink for DingTalkNotifier {
    async fn send_article(&self, message: &ArticleMessage) -> Result<()> {
        let title = format!("新着ニュース: {}", message.title);
        self.send_markdown_raw(&title, &Self::build_article_markdown(message)).await
    }

    async fn send_text(&self, title: &str, text: &str) -> Result<()> {
        self.send_markdown_raw(title, &format!("### {}\n\n{}", title, text)).await
    }

    fn name(&self) -> &'static str {
        "dingtalk"
    }
}
