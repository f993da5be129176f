use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::modules::action::NotificationTracker;
use crate::modules::brain::Summarizer;
use crate::modules::filter::{filter_articles, filter_summary};
use crate::modules::perception::{FeedSource, FilterCriteria, TrackedItem};
use crate::utils::notifier::{ArticleMessage, NotificationSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStage {
    Ingest,
    QueryUnnotified,
    SaveSummary,
    MarkNotified,
}

impl fmt::Display for StoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreStage::Ingest => "ingest",
            StoreStage::QueryUnnotified => "query-unnotified",
            StoreStage::SaveSummary => "save-summary",
            StoreStage::MarkNotified => "mark-notified",
        };
        f.write_str(name)
    }
}

/// 单次运行的失败原因，按阶段区分
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("feed fetch failed: {0:#}")]
    Fetch(#[source] anyhow::Error),

    #[error("store {stage} failed: {source:#}")]
    Store {
        stage: StoreStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("delivery of {failed_id} failed after {delivered} delivered: {source:#}")]
    Delivery {
        delivered: usize,
        failed_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    fn store(stage: StoreStage) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| PipelineError::Store { stage, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    NothingFetched,
    NothingUnnotified,
    NothingMatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub ingested: usize,
    pub unnotified: usize,
    pub filtered: usize,
    pub notified: usize,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn stopped(outcome: RunOutcome) -> Self {
        Self { fetched: 0, ingested: 0, unnotified: 0, filtered: 0, notified: 0, outcome }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub feed_url: String,
    pub criteria: FilterCriteria,
    pub summary_enabled: bool,
    pub summary_max_length: usize,
    pub delivery_delay: Duration,
    pub send_run_summary: bool,
}

/// Fetch → Ingest → QueryUnnotified → Filter → [Summarize] → Notify → MarkNotified
///
/// 单次执行，阶段出错即中止，不在这一层重试。
pub struct Pipeline {
    source: Arc<dyn FeedSource>,
    tracker: NotificationTracker,
    summarizer: Arc<dyn Summarizer>,
    sink: Arc<dyn NotificationSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FeedSource>,
        tracker: NotificationTracker,
        summarizer: Arc<dyn Summarizer>,
        sink: Arc<dyn NotificationSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self { source, tracker, summarizer, sink, settings }
    }

    pub fn tracker(&self) -> &NotificationTracker {
        &self.tracker
    }

    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let items = self
            .source
            .fetch(&self.settings.feed_url)
            .await
            .map_err(PipelineError::Fetch)?;
        if items.is_empty() {
            info!("No items fetched");
            return Ok(RunReport::stopped(RunOutcome::NothingFetched));
        }

        let mut report = RunReport::stopped(RunOutcome::Completed);
        report.fetched = items.len();

        report.ingested = self
            .tracker
            .ingest(&items)
            .await
            .map_err(PipelineError::store(StoreStage::Ingest))?;

        let pending = self
            .tracker
            .unnotified()
            .await
            .map_err(PipelineError::store(StoreStage::QueryUnnotified))?;
        report.unnotified = pending.len();
        info!("📬 {} unnotified items", pending.len());
        if pending.is_empty() {
            report.outcome = RunOutcome::NothingUnnotified;
            return Ok(report);
        }

        let mut selected = filter_articles(&pending, &self.settings.criteria);
        report.filtered = selected.len();
        info!("{}", filter_summary(pending.len(), selected.len(), &self.settings.criteria));
        if selected.is_empty() {
            report.outcome = RunOutcome::NothingMatched;
            return Ok(report);
        }

        if self.settings.summary_enabled {
            self.summarize_all(&mut selected).await?;
        }

        report.notified = self.deliver(&selected).await?;

        if self.settings.send_run_summary {
            self.sink.send_run_summary(report.fetched, report.filtered, report.notified).await;
        }

        info!(
            "✅ Run complete: fetched={} new={} pending={} matched={} notified={}",
            report.fetched, report.ingested, report.unnotified, report.filtered, report.notified
        );
        Ok(report)
    }

    async fn summarize_all(&self, records: &mut [TrackedItem]) -> Result<(), PipelineError> {
        info!("🧠 Summarizing {} items with '{}'", records.len(), self.summarizer.name());
        for record in records.iter_mut() {
            let summary = self
                .summarizer
                .summarize(&record.item, self.settings.summary_max_length)
                .await;
            self.tracker
                .save_summary(record.id(), &summary)
                .await
                .map_err(PipelineError::store(StoreStage::SaveSummary))?;
            record.summary = Some(summary);
        }
        Ok(())
    }

    /// 逐条推送；中途失败时只标记已送达的条目
    async fn deliver(&self, records: &[TrackedItem]) -> Result<usize, PipelineError> {
        let mut delivered: Vec<&str> = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            if i > 0 && !self.settings.delivery_delay.is_zero() {
                sleep(self.settings.delivery_delay).await;
            }

            debug!("📨 {}", record);
            let message = ArticleMessage::from(record);
            if let Err(source) = self.sink.send_article(&message).await {
                error!("❌ Delivery via {} failed for {}: {:#}", self.sink.name(), record.id(), source);
                if !delivered.is_empty() {
                    if let Err(e) = self.tracker.mark_notified(&delivered).await {
                        warn!("⚠️ Could not mark {} delivered items: {:#}", delivered.len(), e);
                    }
                }
                return Err(PipelineError::Delivery {
                    delivered: delivered.len(),
                    failed_id: record.id().to_string(),
                    source,
                });
            }
            delivered.push(record.id());
        }

        info!("📤 Delivered {} items via {}", delivered.len(), self.sink.name());
        self.tracker
            .mark_notified(&delivered)
            .await
            .map_err(PipelineError::store(StoreStage::MarkNotified))
    }
}
