use std::env;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Result, anyhow};
use chrono::Local;
use dotenvy::dotenv;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use feed_notifier::config::{AppConfig, SinkKind, StoreBackend, SummaryBackend};
use feed_notifier::database;
use feed_notifier::modules::action::{ItemStore, MemoryItemStore, NotificationTracker, PgItemStore};
use feed_notifier::modules::brain::{LlmSummarizer, Summarizer, TruncatingSummarizer};
use feed_notifier::modules::perception::FeedCollector;
use feed_notifier::modules::{Pipeline, PipelineError, PipelineSettings};
use feed_notifier::utils::http_client::HttpClientFactory;
use feed_notifier::utils::notifier::{DingTalkNotifier, NotificationSink, SlackNotifier};

fn build_sink(
    kind: SinkKind,
    client: reqwest::Client,
    webhook_url: String,
    cfg: &AppConfig,
) -> Result<Arc<dyn NotificationSink>> {
    match kind {
        SinkKind::Slack => {
            let slack = SlackNotifier::new(client, webhook_url);
            if !slack.validate_webhook_url() {
                return Err(anyhow!("Slack webhook URL is missing or not a hooks.slack.com URL"));
            }
            Ok(Arc::new(slack))
        }
        SinkKind::Dingtalk => {
            if webhook_url.is_empty() {
                return Err(anyhow!("DingTalk webhook URL is missing"));
            }
            Ok(Arc::new(DingTalkNotifier::new(
                client,
                webhook_url,
                cfg.notify.secret.clone(),
                cfg.notify.keyword.clone(),
            )))
        }
    }
}

fn build_summarizer(cfg: &AppConfig) -> Result<Arc<dyn Summarizer>> {
    let api_key = cfg.llm_api_key();
    match cfg.summary.backend {
        SummaryBackend::Llm if !api_key.is_empty() => {
            info!("🧠 Summarizer: LLM ({})", cfg.summary.llm.model);
            Ok(Arc::new(LlmSummarizer::new(
                HttpClientFactory::create_llm()?,
                api_key,
                cfg.summary.llm.base_url.clone(),
                cfg.summary.llm.model.clone(),
            )))
        }
        backend => {
            if backend == SummaryBackend::Llm {
                warn!("⚠️ LLM backend selected but no API key configured. Using simple summarizer.");
            }
            info!("🧠 Summarizer: simple");
            Ok(Arc::new(TruncatingSummarizer::new()))
        }
    }
}

async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn ItemStore>> {
    match cfg.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store: dedup state is lost on restart");
            Ok(Arc::new(MemoryItemStore::new()))
        }
        StoreBackend::Postgres => {
            let db_url = cfg
                .database_url()
                .ok_or_else(|| anyhow!("DATABASE_URL must be set for the postgres store"))?;
            let pool = database::connect(&db_url).await?;
            database::init_database(&pool).await?;
            Ok(Arc::new(PgItemStore::new(pool)))
        }
    }
}

async fn report_failure(error_sink: Option<&Arc<dyn NotificationSink>>, err: &PipelineError) {
    error!("🔥 Run failed: {}", err);
    let Some(sink) = error_sink else {
        return;
    };
    let text = format!(
        "*エラーメッセージ:*\n{}\n\n*発生時刻:*\n{}",
        err,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    sink.send_error_message(&text).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let run_once = env::args().any(|a| a == "--once");
    info!("Starting feed_notifier v{}...", env!("CARGO_PKG_VERSION"));

    let cfg = AppConfig::load()?;
    info!("RSS Feed URL: {}", cfg.feed.url);
    info!("Filter Keywords: {}", cfg.filter.keywords.join(", "));

    let http = HttpClientFactory::create()?;
    let store = build_store(&cfg).await?;
    let summarizer = build_summarizer(&cfg)?;
    let sink = build_sink(cfg.notify.sink, http.clone(), cfg.notify.webhook_url.clone(), &cfg)?;

    let error_sink = match cfg.notify.error_webhook_url.clone().filter(|u| !u.is_empty()) {
        Some(url) => match build_sink(cfg.notify.sink, http.clone(), url, &cfg) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Error webhook disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let pipeline = Pipeline::new(
        Arc::new(FeedCollector::new(http.clone())),
        NotificationTracker::new(store),
        summarizer,
        sink,
        PipelineSettings {
            feed_url: cfg.feed.url.clone(),
            criteria: cfg.criteria(),
            summary_enabled: cfg.summary.enabled,
            summary_max_length: cfg.summary.max_length,
            delivery_delay: Duration::from_millis(cfg.notify.delay_ms),
            send_run_summary: cfg.notify.send_run_summary,
        },
    );

    let poll_interval = Duration::from_secs(cfg.timing.poll_interval_sec.max(60));
    info!("✅ System initialized. Loop starting...");

    loop {
        match pipeline.run_once().await {
            Ok(report) => info!("Run finished: {:?}", report.outcome),
            Err(e) => {
                report_failure(error_sink.as_ref(), &e).await;
                if run_once {
                    return Err(e.into());
                }
            }
        }

        if run_once {
            return Ok(());
        }

        info!("💤 Sleeping {}s...", poll_interval.as_secs());
        sleep(poll_interval).await;
    }
}
