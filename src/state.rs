use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::error::{AgentError, Result};
use crate::models::CategorizationRecord;

/// Bumped when the on-disk layout changes incompatibly
pub const STATE_VERSION: u32 = 1;

/// Oldest ids are evicted past this many processed messages
pub const MAX_PROCESSED_IDS: usize = 10_000;

/// Persistent agent state: which messages were already handled and the
/// categorization history that summaries are built from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    processed_ids: VecDeque<String>,
    #[serde(skip)]
    processed_index: HashSet<String>,
    pub history: Vec<CategorizationRecord>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_summary_at: Option<DateTime<Utc>>,
    pub total_categorized: u64,
}

impl AgentState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            created_at: now,
            updated_at: now,
            processed_ids: VecDeque::new(),
            processed_index: HashSet::new(),
            history: Vec::new(),
            last_run_at: None,
            last_summary_at: None,
            total_categorized: 0,
        }
    }

    /// Save state to disk
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::debug!("Saved agent state to {:?}", path);
        Ok(())
    }

    /// Load state from disk, starting fresh when no file exists
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No existing state file found, starting fresh");
            return Ok(Self::new());
        }

        let json = tokio::fs::read_to_string(path).await?;
        let mut state: Self = serde_json::from_str(&json)?;

        if state.version > STATE_VERSION {
            return Err(AgentError::StateError(format!(
                "State file {:?} has version {}, newer than supported version {}",
                path, state.version, STATE_VERSION
            )));
        }

        state.processed_index = state.processed_ids.iter().cloned().collect();

        tracing::info!(
            "Loaded agent state: processed={}, history={}, total_categorized={}",
            state.processed_ids.len(),
            state.history.len(),
            state.total_categorized
        );

        Ok(state)
    }

    pub fn is_processed(&self, message_id: &str) -> bool {
        self.processed_index.contains(message_id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn mark_processed(&mut self, message_id: &str) {
        if !self.processed_index.insert(message_id.to_string()) {
            return;
        }
        self.processed_ids.push_back(message_id.to_string());

        while self.processed_ids.len() > MAX_PROCESSED_IDS {
            if let Some(evicted) = self.processed_ids.pop_front() {
                self.processed_index.remove(&evicted);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Append a categorization to history and mark its message processed
    pub fn record(&mut self, record: CategorizationRecord) {
        self.mark_processed(&record.message_id);
        self.total_categorized += 1;
        self.history.push(record);
    }

    /// Drop history older than the retention window, returning how many went
    pub fn prune_history(&mut self, now: DateTime<Utc>, retention_days: u32) -> usize {
        let cutoff = now - Duration::days(i64::from(retention_days));
        let before = self.history.len();
        self.history.retain(|r| r.categorized_at >= cutoff);
        let removed = before - self.history.len();
        if removed > 0 {
            tracing::debug!("Pruned {} history records older than {}", removed, cutoff);
        }
        removed
    }

    /// Records categorized at or after `since`, oldest first
    pub fn history_since(&self, since: DateTime<Utc>) -> Vec<&CategorizationRecord> {
        let mut records: Vec<_> = self
            .history
            .iter()
            .filter(|r| r.categorized_at >= since)
            .collect();
        records.sort_by_key(|r| r.categorized_at);
        records
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}
