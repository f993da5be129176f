use async_trait::async_trait;
use reqwest::Client;
use anyhow::{Result, anyhow, Context};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::modules::perception::Item;
use super::summarizer::{Summarizer, TruncatingSummarizer};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_COMPLETION_TOKENS: u32 = 4000;

/// OpenAI 兼容的 chat/completions 摘要后端
///
/// 任何失败 (网络、非 2xx、choices 为空、content 为空) 都会退回
/// `TruncatingSummarizer`，调用方看不到第二条错误通道。
pub struct LlmSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    fallback: TruncatingSummarizer,
}

impl LlmSummarizer {
    pub fn new(client: Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
            fallback: TruncatingSummarizer::new(),
        }
    }

    fn build_prompt(&self, item: &Item, max_length: usize) -> String {
        format!(
            "あなたはSNSマーケティングの専門家です。以下の記事を読んで、日本語で簡潔に要約してください。\n\n\
            # 記事情報\n\
            タイトル: {}\n\
            URL: {}\n\
            内容: {}\n\n\
            # 出力フォーマット\n\
            {{記事の内容を簡潔に要約。重要なポイントを箇条書きまたは段落形式で記載}}\n\n\
            💡SNS運営に影響しそうなポイント\n\
            {{SNSマーケティングやアカウント運営への影響を実務的な観点から分析}}\n\n\
            # 注意事項\n\
            - 目安は{}文字以内\n\
            - URLは出力に含めない",
            item.title, item.link, item.description, max_length
        )
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(anyhow!("LLM API key missing"));
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
        });

        let resp = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("LLM network error")?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(anyhow!("{} API Error [{}]: {}", self.model, status, err));
        }

        let json_res: Value = resp.json().await.context("LLM response is not JSON")?;
        extract_content(&json_res)
    }
}

fn extract_content(json_res: &Value) -> Result<String> {
    let choices = json_res["choices"].as_array().filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow!("LLM response has no choices"))?;

    let content = choices[0]["message"]["content"].as_str().unwrap_or_default().trim();
    if content.is_empty() {
        // 推理模型 token 用尽时 content 会是空串
        return Err(anyhow!("LLM returned empty content"));
    }
    Ok(content.to_string())
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, item: &Item, max_length: usize) -> String {
        let prompt = self.build_prompt(item, max_length);
        match self.call_llm(&prompt).await {
            Ok(summary) => {
                info!("🧠 [{}] Summarized {}", self.model, item.id);
                summary
            }
            Err(e) => {
                warn!("⚠️ LLM summary failed for {} ({}). Falling back to simple summarizer.", item.id, e);
                self.fallback.summarize_item(item, max_length)
            }
        }
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}
