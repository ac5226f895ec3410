use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AgentError;

/// Email as seen by the categorizer (metadata plus snippet, no body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub sender_domain: String,
    pub sender_name: String,
    pub subject: String,
    pub snippet: String,
    pub recipients: Vec<String>,
    pub date_received: DateTime<Utc>,
    pub labels: Vec<String>,
    pub has_unsubscribe: bool,
    pub is_automated: bool,
}

impl EmailMessage {
    pub fn is_unread(&self) -> bool {
        self.labels.iter().any(|l| l == "UNREAD")
    }

    pub fn is_in_inbox(&self) -> bool {
        self.labels.iter().any(|l| l == "INBOX")
    }
}

/// How a categorization was reached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CategorizationMethod {
    /// Keyword and sender rules only
    Rules,
    /// Language model verdict
    Model,
    /// Model was asked but failed; rules result used instead
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Categorization {
    pub message_id: String,
    pub label_key: String,
    pub confidence: f32,
    pub method: CategorizationMethod,
    pub action_required: bool,
    pub reasoning: Option<String>,
}

/// A categorized email kept in the agent history for summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationRecord {
    pub message_id: String,
    pub thread_id: String,
    pub label_key: String,
    pub sender_email: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub categorized_at: DateTime<Utc>,
    pub action_required: bool,
}

impl CategorizationRecord {
    pub fn new(message: &EmailMessage, categorization: &Categorization, now: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            label_key: categorization.label_key.clone(),
            sender_email: message.sender_email.clone(),
            subject: message.subject.clone(),
            received_at: message.date_received,
            categorized_at: now,
            action_required: categorization.action_required,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod {
    Daily,
    Weekly,
}

impl SummaryPeriod {
    /// Length of the window a summary covers
    pub fn window(&self) -> Duration {
        match self {
            SummaryPeriod::Daily => Duration::hours(24),
            SummaryPeriod::Weekly => Duration::days(7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryPeriod::Daily => "daily",
            SummaryPeriod::Weekly => "weekly",
        }
    }
}

impl fmt::Display for SummaryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryPeriod {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(SummaryPeriod::Daily),
            "weekly" => Ok(SummaryPeriod::Weekly),
            other => Err(AgentError::ConfigError(format!(
                "Invalid summary period: '{}'. Must be 'daily' or 'weekly'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelCount {
    pub label_key: String,
    pub count: usize,
    /// Most recent subjects in this label, newest first
    pub examples: Vec<DigestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestEntry {
    pub sender_email: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub label_key: String,
}

impl From<&CategorizationRecord> for DigestEntry {
    fn from(record: &CategorizationRecord) -> Self {
        Self {
            sender_email: record.sender_email.clone(),
            subject: record.subject.clone(),
            received_at: record.received_at,
            label_key: record.label_key.clone(),
        }
    }
}

/// Periodic digest of categorized mail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub period: SummaryPeriod,
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub total: usize,
    pub label_counts: Vec<LabelCount>,
    pub action_items: Vec<DigestEntry>,
    pub top_senders: Vec<(String, usize)>,
    pub highlights: Option<String>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn count_for(&self, label_key: &str) -> usize {
        self.label_counts
            .iter()
            .find(|c| c.label_key == label_key)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

/// Outcome of a single categorization pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub scanned: usize,
    pub already_processed: usize,
    pub categorized: usize,
    pub labeled: usize,
    pub archived: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub label_counts: Vec<(String, usize)>,
}

impl RunReport {
    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }
}
