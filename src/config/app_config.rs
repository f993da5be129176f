use serde::{Deserialize, Deserializer};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use anyhow::{Result, Context};
use std::env;

use crate::modules::perception::FilterCriteria;

const CONFIG_FILE: &str = "notifier_config";
const ENV_PREFIX: &str = "NOTIFIER";

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// TOML 数组或逗号分隔字符串均可
    #[serde(deserialize_with = "keyword_list")]
    pub keywords: Vec<String>,
    pub max_age_days: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryBackend {
    Simple,
    #[serde(alias = "openai")]
    Llm,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub max_length: usize,
    pub backend: SummaryBackend,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Slack,
    Dingtalk,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    pub sink: SinkKind,
    #[serde(default)]
    pub webhook_url: String,
    /// DingTalk 加签密钥
    #[serde(default)]
    pub secret: String,
    /// DingTalk 自定义关键词
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub error_webhook_url: Option<String>,
    pub delay_ms: u64,
    pub send_run_summary: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    pub poll_interval_sec: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub filter: FilterConfig,
    pub summary: SummaryConfig,
    pub notify: NotifyConfig,
    pub store: StoreConfig,
    pub timing: TimingConfig,
}

impl AppConfig {
    /// notifier_config.{toml,...} (可选) + NOTIFIER__SECTION__KEY 环境变量
    pub fn load() -> Result<Self> {
        let builder = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        finish(builder)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        finish(defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria::new(self.filter.keywords.clone(), self.filter.max_age_days)
    }

    /// 未配置时退回 DATABASE_URL
    pub fn database_url(&self) -> Option<String> {
        self.store
            .database_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| env::var("DATABASE_URL").ok())
    }

    /// 未配置时退回 OPENAI_API_KEY
    pub fn llm_api_key(&self) -> String {
        if !self.summary.llm.api_key.is_empty() {
            return self.summary.llm.api_key.clone();
        }
        env::var("OPENAI_API_KEY").unwrap_or_default()
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    let builder = Config::builder()
        .set_default("feed.url", "https://www.socialmediatoday.com/feeds/news/")?
        .set_default("filter.keywords", Vec::<String>::new())?
        .set_default("filter.max_age_days", 7)?
        .set_default("summary.enabled", true)?
        .set_default("summary.max_length", 200)?
        .set_default("summary.backend", "simple")?
        .set_default("summary.llm.base_url", crate::modules::brain::llm::DEFAULT_BASE_URL)?
        .set_default("summary.llm.model", crate::modules::brain::llm::DEFAULT_MODEL)?
        .set_default("notify.sink", "slack")?
        .set_default("notify.delay_ms", 500)?
        .set_default("notify.send_run_summary", false)?
        .set_default("store.backend", "memory")?
        .set_default("timing.poll_interval_sec", 3600)?;
    Ok(builder)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig> {
    let settings = builder.build().context("Failed to build configuration")?;
    let cfg: AppConfig = settings.try_deserialize().context("Invalid configuration")?;
    Ok(cfg)
}

fn keyword_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    let raw = match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };

    Ok(raw
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}
