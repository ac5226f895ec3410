//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gmail_categorizer_agent::config::labels::LabelSet;
use gmail_categorizer_agent::config::Config;
use gmail_categorizer_agent::error::{AgentError, Result};
use gmail_categorizer_agent::gmail_client::{GmailClient, LabelInfo};
use gmail_categorizer_agent::llm::LanguageModel;
use gmail_categorizer_agent::models::{
    Categorization, CategorizationMethod, CategorizationRecord, EmailMessage,
};
use mockall::mock;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Create a test message with default values
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> EmailMessage {
    let domain = sender
        .split('@')
        .nth(1)
        .unwrap_or("example.com")
        .to_string();

    EmailMessage {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender_email: sender.to_string(),
        sender_domain: domain,
        sender_name: "Test Sender".to_string(),
        subject: subject.to_string(),
        snippet: String::new(),
        recipients: vec!["me@example.com".to_string()],
        date_received: Utc::now(),
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
        has_unsubscribe: false,
        is_automated: false,
    }
}

/// Create a test message with automated sender
pub fn create_automated_message(id: &str, sender: &str, subject: &str) -> EmailMessage {
    let mut message = create_test_message(id, sender, subject);
    message.is_automated = true;
    message.has_unsubscribe = true;
    message
}

pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// Every label of the set as it would exist in Gmail, with ids `Label_{key}`
pub fn existing_labels(labels: &LabelSet, prefix: &str) -> Vec<LabelInfo> {
    let mut infos = vec![create_test_label_info("Label_parent", prefix)];
    infos.extend(labels.iter().map(|l| {
        create_test_label_info(&format!("Label_{}", l.key), &format!("{}/{}", prefix, l.name))
    }));
    infos
}

/// Config whose file outputs land under `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.summary.output_dir = dir.join("summaries");
    config
}

/// A history record for `message` categorized as `label_key` at `at`
pub fn record_at(
    message: &EmailMessage,
    label_key: &str,
    action_required: bool,
    at: DateTime<Utc>,
) -> CategorizationRecord {
    let categorization = Categorization {
        message_id: message.id.clone(),
        label_key: label_key.to_string(),
        confidence: 0.9,
        method: CategorizationMethod::Rules,
        action_required,
        reasoning: None,
    };
    CategorizationRecord::new(message, &categorization, at)
}

/// Model stub answering every prompt with the same text
pub struct ScriptedModel {
    answer: std::result::Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(AgentError::ModelError)
    }
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait]
    impl GmailClient for GmailClient {
        async fn profile_email(&self) -> Result<String>;
        async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
        async fn get_message(&self, id: &str) -> Result<EmailMessage>;
        async fn fetch_messages(&self, ids: Vec<String>) -> Result<Vec<EmailMessage>>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str, background: &str, text: &str) -> Result<String>;
        async fn batch_modify_labels(
            &self,
            message_ids: &[String],
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<usize>;
        async fn send_raw_message(&self, raw: Vec<u8>) -> Result<String>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_message() {
        let msg = create_test_message("msg1", "test@example.com", "Test Subject");
        assert_eq!(msg.id, "msg1");
        assert_eq!(msg.sender_domain, "example.com");
        assert!(msg.is_in_inbox());
        assert!(msg.is_unread());
    }

    #[test]
    fn test_existing_labels_cover_set() {
        let labels = LabelSet::defaults();
        let infos = existing_labels(&labels, "AI");
        assert_eq!(infos.len(), labels.len() + 1);
        assert!(infos.iter().any(|l| l.name == "AI/Finance" && l.id == "Label_finance"));
    }
}
