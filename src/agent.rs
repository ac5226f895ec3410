//! The categorization agent: pulls recent inbox mail, labels it, keeps a
//! history and turns that history into periodic summaries

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::categorizer::{CategorizationSettings, Categorizer};
use crate::config::labels::LabelSet;
use crate::config::prompts::{summary_prompt, SYSTEM_PROMPT};
use crate::config::templates::{
    build_raw_email, render_summary_html, render_summary_text, summary_subject,
};
use crate::config::{Config, SummaryDelivery};
use crate::error::{AgentError, Result};
use crate::gmail_client::GmailClient;
use crate::llm::LanguageModel;
use crate::models::{
    CategorizationRecord, DigestEntry, LabelCount, RunReport, Summary, SummaryPeriod,
};
use crate::state::AgentState;
use crate::utils::build_inbox_query;

const INBOX_LABEL: &str = "INBOX";
const TOP_SENDERS: usize = 5;

/// What happened to a delivered summary
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Printed,
    Written(PathBuf),
    Emailed { message_id: String, recipient: String },
    /// Dry run: the summary was rendered but not written or sent
    Skipped,
}

pub struct CategorizerAgent<C: GmailClient> {
    client: C,
    config: Config,
    labels: LabelSet,
    categorizer: Categorizer,
    model: Option<Arc<dyn LanguageModel>>,
    state: AgentState,
    state_path: PathBuf,
    /// label key -> Gmail label id, filled by `ensure_labels`
    label_ids: HashMap<String, String>,
}

impl<C: GmailClient> CategorizerAgent<C> {
    /// Build an agent, loading persisted state from `state_path`
    pub async fn new(
        client: C,
        config: Config,
        model: Option<Arc<dyn LanguageModel>>,
        state_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let state_path = state_path.into();
        let labels = config.label_set()?;

        let mut categorizer =
            Categorizer::new(labels.clone(), CategorizationSettings::from_config(&config));
        if let Some(model) = &model {
            categorizer = categorizer.with_model(Arc::clone(model));
        }

        let state = AgentState::load(&state_path).await?;

        Ok(Self {
            client,
            config,
            labels,
            categorizer,
            model,
            state,
            state_path,
            label_ids: HashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn categorizer(&self) -> &Categorizer {
        &self.categorizer
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.execution.dry_run
    }

    async fn save_state(&self) -> Result<()> {
        if self.is_dry_run() {
            debug!("[DRY RUN] Not saving state");
            return Ok(());
        }
        self.state.save(&self.state_path).await
    }

    /// Make sure every label exists in Gmail, returning key -> label id
    ///
    /// Existing labels are matched case-insensitively. In dry-run mode nothing
    /// is created and only labels that already exist are returned.
    pub async fn ensure_labels(&mut self) -> Result<HashMap<String, String>> {
        let existing: HashMap<String, String> = self
            .client
            .list_labels()
            .await?
            .into_iter()
            .map(|l| (l.name.to_lowercase(), l.id))
            .collect();
        debug!("Found {} existing Gmail labels", existing.len());

        let prefix = self.config.labels.prefix.clone();
        let dry_run = self.is_dry_run();

        if !existing.contains_key(&prefix.to_lowercase()) {
            if dry_run {
                info!("[DRY RUN] Would create parent label '{}'", prefix);
            } else {
                self.client
                    .create_label(&prefix, "#cccccc", "#000000")
                    .await
                    .map_err(|e| {
                        AgentError::LabelError(format!(
                            "Failed to create parent label '{}': {}",
                            prefix, e
                        ))
                    })?;
                info!("Created parent label '{}'", prefix);
            }
        }

        let mut label_ids = HashMap::new();
        for label in self.labels.iter() {
            let Some(full_name) = self.labels.gmail_name(&prefix, &label.key) else {
                continue;
            };

            if let Some(id) = existing.get(&full_name.to_lowercase()) {
                label_ids.insert(label.key.clone(), id.clone());
                continue;
            }

            if dry_run {
                info!("[DRY RUN] Would create label '{}'", full_name);
                continue;
            }

            let id = self
                .client
                .create_label(&full_name, &label.background_color, &label.text_color)
                .await
                .map_err(|e| {
                    AgentError::LabelError(format!(
                        "Failed to create label '{}': {}",
                        full_name, e
                    ))
                })?;
            info!("Created label '{}'", full_name);
            label_ids.insert(label.key.clone(), id);
        }

        self.label_ids = label_ids.clone();
        Ok(label_ids)
    }

    fn should_archive(&self, label_key: &str) -> bool {
        self.config.categorization.archive_enabled
            && self
                .config
                .labels
                .archive_categories
                .iter()
                .any(|k| k == label_key)
    }

    /// One categorization pass over recent inbox mail
    pub async fn run_once(&mut self) -> Result<RunReport> {
        let started_at = Utc::now();
        let dry_run = self.is_dry_run();
        let mut report = RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            completed_at: started_at,
            scanned: 0,
            already_processed: 0,
            categorized: 0,
            labeled: 0,
            archived: 0,
            failed: 0,
            dry_run,
            label_counts: Vec::new(),
        };

        let since = started_at - Duration::hours(i64::from(self.config.gmail.lookback_hours));
        let query = build_inbox_query(since, self.config.gmail.extra_query.as_deref());
        info!("Run {}: searching '{}'", report.run_id, query);

        let ids = self
            .client
            .list_message_ids(&query, self.config.gmail.max_messages_per_run)
            .await?;
        report.scanned = ids.len();

        let new_ids: Vec<String> = ids
            .into_iter()
            .filter(|id| !self.state.is_processed(id))
            .collect();
        report.already_processed = report.scanned - new_ids.len();

        if new_ids.is_empty() {
            info!(
                "No new messages ({} already processed)",
                report.already_processed
            );
            return self.finish_run(report).await;
        }

        if !dry_run && self.label_ids.len() < self.labels.len() {
            self.ensure_labels().await?;
        }

        let requested = new_ids.len();
        let messages = self.client.fetch_messages(new_ids).await?;
        if messages.len() < requested {
            warn!("{} of {} new messages could not be fetched", requested - messages.len(), requested);
            report.failed += requested - messages.len();
        }
        let categorizations = self
            .categorizer
            .categorize_batch(&messages, self.config.llm.max_concurrent)
            .await;
        report.categorized = categorizations.len();

        // Group message indices by label, in label set order
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (idx, categorization) in categorizations.iter().enumerate() {
            match groups.iter_mut().find(|(k, _)| *k == categorization.label_key) {
                Some((_, members)) => members.push(idx),
                None => groups.push((categorization.label_key.clone(), vec![idx])),
            }
        }
        groups.sort_by_key(|(key, _)| self.labels.position(key).unwrap_or(usize::MAX));

        let now = Utc::now();
        for (label_key, members) in &groups {
            report.label_counts.push((label_key.clone(), members.len()));
            let archive = self.should_archive(label_key);
            let message_ids: Vec<String> =
                members.iter().map(|&i| messages[i].id.clone()).collect();

            if dry_run {
                info!(
                    "[DRY RUN] Would label {} messages as '{}'{}",
                    message_ids.len(),
                    label_key,
                    if archive { " and archive them" } else { "" }
                );
                continue;
            }

            let Some(label_id) = self.label_ids.get(label_key).cloned() else {
                warn!("No Gmail label id for '{}', skipping {} messages", label_key, members.len());
                report.failed += members.len();
                continue;
            };

            let remove: Vec<String> = if archive {
                vec![INBOX_LABEL.to_string()]
            } else {
                Vec::new()
            };

            match self
                .client
                .batch_modify_labels(&message_ids, &[label_id], &remove)
                .await
            {
                Ok(modified) => {
                    report.labeled += modified;
                    if archive {
                        report.archived += modified;
                    }
                    for &i in members {
                        self.state.record(CategorizationRecord::new(
                            &messages[i],
                            &categorizations[i],
                            now,
                        ));
                    }
                    debug!("Labeled {} messages as '{}'", modified, label_key);
                }
                Err(e) => {
                    error!("Failed to label {} messages as '{}': {}", members.len(), label_key, e);
                    report.failed += members.len();
                }
            }
        }

        self.finish_run(report).await
    }

    async fn finish_run(&mut self, mut report: RunReport) -> Result<RunReport> {
        report.completed_at = Utc::now();

        if !report.dry_run {
            self.state
                .prune_history(report.completed_at, self.config.agent.history_retention_days);
            self.state.last_run_at = Some(report.completed_at);
            self.save_state().await?;
        }

        info!(
            "Run {} finished in {}s: scanned={}, categorized={}, labeled={}, archived={}, failed={}",
            report.run_id,
            report.duration_seconds(),
            report.scanned,
            report.categorized,
            report.labeled,
            report.archived,
            report.failed
        );
        Ok(report)
    }

    /// Build a summary of everything categorized in the window ending at `now`
    pub fn build_summary(&self, period: SummaryPeriod, now: DateTime<Utc>) -> Summary {
        let window_start = now - period.window();
        let records: Vec<&CategorizationRecord> = self
            .state
            .history_since(window_start)
            .into_iter()
            .filter(|r| r.categorized_at <= now)
            .collect();

        let max_items = self.config.summary.max_items_per_label;
        let mut by_label: Vec<(String, Vec<&CategorizationRecord>)> = Vec::new();
        for &record in &records {
            match by_label.iter_mut().find(|(k, _)| *k == record.label_key) {
                Some((_, members)) => members.push(record),
                None => by_label.push((record.label_key.clone(), vec![record])),
            }
        }
        by_label.sort_by(|(a, _), (b, _)| {
            let pa = self.labels.position(a).unwrap_or(usize::MAX);
            let pb = self.labels.position(b).unwrap_or(usize::MAX);
            pa.cmp(&pb).then_with(|| a.cmp(b))
        });

        let label_counts = by_label
            .into_iter()
            .map(|(label_key, members)| LabelCount {
                count: members.len(),
                examples: members
                    .iter()
                    .rev()
                    .take(max_items)
                    .map(|r| DigestEntry::from(*r))
                    .collect(),
                label_key,
            })
            .collect();

        let action_items = records
            .iter()
            .rev()
            .filter(|r| r.action_required)
            .map(|r| DigestEntry::from(*r))
            .collect();

        let mut sender_counts: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            *sender_counts.entry(record.sender_email.as_str()).or_default() += 1;
        }
        let mut top_senders: Vec<(String, usize)> = sender_counts
            .into_iter()
            .map(|(sender, count)| (sender.to_string(), count))
            .collect();
        top_senders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_senders.truncate(TOP_SENDERS);

        Summary {
            period,
            generated_at: now,
            window_start,
            total: records.len(),
            label_counts,
            action_items,
            top_senders,
            highlights: None,
        }
    }

    /// Build the current summary and, when a model is configured, add
    /// highlights written by it
    pub async fn summarize(&self, period: SummaryPeriod) -> Result<Summary> {
        let mut summary = self.build_summary(period, Utc::now());

        if let (Some(model), false) = (&self.model, summary.is_empty()) {
            let prompt = summary_prompt(&summary, &self.labels);
            match model.complete(SYSTEM_PROMPT, &prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    summary.highlights = Some(text.trim().to_string());
                }
                Ok(_) => debug!("Model {} returned empty highlights", model.name()),
                Err(e) => warn!("Could not generate summary highlights: {}", e),
            }
        }

        Ok(summary)
    }

    /// Send the summary to the configured destination and remember when
    ///
    /// A dry run writes and sends nothing but still marks the summary as
    /// delivered in memory, so `watch --dry-run` produces one per period.
    pub async fn deliver_summary(&mut self, summary: &Summary) -> Result<Delivery> {
        let text = render_summary_text(summary, &self.labels)?;
        let dry_run = self.is_dry_run();

        let delivery = match self.config.summary.delivery {
            SummaryDelivery::Stdout => {
                println!("{}", text);
                Delivery::Printed
            }
            SummaryDelivery::File if dry_run => {
                info!(
                    "[DRY RUN] Would write summary to {:?}",
                    self.config.summary.output_dir
                );
                Delivery::Skipped
            }
            SummaryDelivery::File => {
                let dir = &self.config.summary.output_dir;
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    AgentError::DeliveryError(format!("Failed to create {:?}: {}", dir, e))
                })?;
                let path = dir.join(format!(
                    "summary-{}.txt",
                    summary.generated_at.format("%Y%m%d-%H%M%S")
                ));
                tokio::fs::write(&path, &text).await.map_err(|e| {
                    AgentError::DeliveryError(format!("Failed to write {:?}: {}", path, e))
                })?;
                info!("Summary written to {:?}", path);
                Delivery::Written(path)
            }
            SummaryDelivery::Email => {
                let sender = self.client.profile_email().await?;
                let recipient = self
                    .config
                    .summary
                    .recipient
                    .clone()
                    .unwrap_or_else(|| sender.clone());

                let html = render_summary_html(summary, &self.labels)?;
                let raw =
                    build_raw_email(&sender, &recipient, &summary_subject(summary), &text, &html)?;

                if dry_run {
                    info!("[DRY RUN] Would email summary to {}", recipient);
                    Delivery::Skipped
                } else {
                    let message_id = self.client.send_raw_message(raw).await?;
                    info!("Summary emailed to {} (message {})", recipient, message_id);
                    Delivery::Emailed {
                        message_id,
                        recipient,
                    }
                }
            }
        };

        self.state.last_summary_at = Some(summary.generated_at);
        if !dry_run {
            self.save_state().await?;
        }

        Ok(delivery)
    }

    /// Is a summary due? The first one comes one full period after the state
    /// was created.
    pub fn summary_due(&self, now: DateTime<Utc>) -> bool {
        if !self.config.summary.enabled {
            return false;
        }
        let last = self.state.last_summary_at.unwrap_or(self.state.created_at);
        now - last >= self.config.summary.period.window()
    }

    /// Poll until `shutdown` resolves: categorize on every tick and deliver
    /// summaries when they come due
    pub async fn watch<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval = std::time::Duration::from_secs(self.config.agent.poll_interval_secs);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Watching inbox every {:?}", interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping watch loop");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!("Categorization run failed: {}", e);
                    }

                    if self.summary_due(Utc::now()) {
                        let period = self.config.summary.period;
                        match self.summarize(period).await {
                            Ok(summary) => {
                                if let Err(e) = self.deliver_summary(&summary).await {
                                    error!("Summary delivery failed: {}", e);
                                }
                            }
                            Err(e) => error!("Summary generation failed: {}", e),
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
