//! Email categorization: weighted keyword/sender rules with an optional
//! language model for the cases the rules are unsure about

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::labels::{LabelSet, FALLBACK_LABEL, PERSONAL_LABEL};
use crate::config::prompts::{categorization_prompt, SYSTEM_PROMPT};
use crate::config::{CategorizationMode, Config};
use crate::error::{AgentError, Result};
use crate::llm::LanguageModel;
use crate::models::{Categorization, CategorizationMethod, EmailMessage};
use crate::utils::extract_json_object;

const SUBJECT_KEYWORD_WEIGHT: u32 = 3;
const SNIPPET_KEYWORD_WEIGHT: u32 = 1;
const SENDER_PATTERN_WEIGHT: u32 = 4;
const DOMAIN_WEIGHT: u32 = 5;
const UNSUBSCRIBE_WEIGHT: u32 = 2;
const AUTOMATED_WEIGHT: u32 = 1;

const MAX_RULE_CONFIDENCE: f32 = 0.95;
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Labels that a List-Unsubscribe header points towards
const BULK_LABELS: &[&str] = &["newsletters", "promotions"];
const NOTIFICATIONS_LABEL: &str = "notifications";

static ACTION_PHRASES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(action required|action needed|please (respond|reply|confirm|review|sign|approve)|respond by|reply by|due (today|tomorrow)|deadline|rsvp|awaiting your|signature required)\b",
    )
    .unwrap()
});

/// Runtime knobs taken from the `[categorization]` config section
#[derive(Debug, Clone)]
pub struct CategorizationSettings {
    pub mode: CategorizationMode,
    pub confidence_threshold: f32,
}

impl CategorizationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.categorization.mode,
            confidence_threshold: config.categorization.confidence_threshold,
        }
    }
}

impl Default for CategorizationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A validated model answer
#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub label_key: String,
    pub confidence: f32,
    pub action_required: bool,
    pub reasoning: Option<String>,
}

#[derive(Deserialize)]
struct RawVerdict {
    label: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    action_required: Option<bool>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct Categorizer {
    labels: LabelSet,
    settings: CategorizationSettings,
    model: Option<Arc<dyn LanguageModel>>,
}

impl Categorizer {
    pub fn new(labels: LabelSet, settings: CategorizationSettings) -> Self {
        Self {
            labels,
            settings,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn settings(&self) -> &CategorizationSettings {
        &self.settings
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Score every label against the message and pick the best one
    pub fn categorize_with_rules(&self, message: &EmailMessage) -> Categorization {
        let mut scored: Vec<(u32, u8, usize, &str)> = self
            .labels
            .iter()
            .enumerate()
            .map(|(position, label)| {
                let mut score = SUBJECT_KEYWORD_WEIGHT * label.keyword_hits(&message.subject) as u32
                    + SNIPPET_KEYWORD_WEIGHT * label.keyword_hits(&message.snippet) as u32;

                if label.matches_sender(&message.sender_email) {
                    score += SENDER_PATTERN_WEIGHT;
                }
                if label.matches_domain(&message.sender_domain) {
                    score += DOMAIN_WEIGHT;
                }
                if message.has_unsubscribe && BULK_LABELS.contains(&label.key.as_str()) {
                    score += UNSUBSCRIBE_WEIGHT;
                }
                if message.is_automated && label.key == NOTIFICATIONS_LABEL {
                    score += AUTOMATED_WEIGHT;
                }

                (score, label.priority, position, label.key.as_str())
            })
            .collect();

        // Highest score, then priority, then earliest in the set
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));

        let action_required = self.detects_action(message);
        let (best_score, best_key) = scored
            .first()
            .map_or((0, FALLBACK_LABEL), |best| (best.0, best.3));

        if best_score == 0 {
            let label_key = if !message.is_automated && self.labels.contains(PERSONAL_LABEL) {
                PERSONAL_LABEL
            } else {
                FALLBACK_LABEL
            };
            return Categorization {
                message_id: message.id.clone(),
                label_key: label_key.to_string(),
                confidence: FALLBACK_CONFIDENCE,
                method: CategorizationMethod::Rules,
                action_required,
                reasoning: Some("No rule matched".to_string()),
            };
        }

        let runner_up = scored.get(1).map_or(0, |s| s.0);
        let margin_bonus = (0.02 * (best_score - runner_up) as f32).min(0.1);
        let confidence =
            (0.35 + 0.1 * best_score as f32 + margin_bonus).min(MAX_RULE_CONFIDENCE);

        Categorization {
            message_id: message.id.clone(),
            label_key: best_key.to_string(),
            confidence,
            method: CategorizationMethod::Rules,
            action_required: action_required || best_key == "action-required",
            reasoning: Some(format!("Rule score {} (runner-up {})", best_score, runner_up)),
        }
    }

    fn detects_action(&self, message: &EmailMessage) -> bool {
        ACTION_PHRASES.is_match(&message.subject) || ACTION_PHRASES.is_match(&message.snippet)
    }

    /// Validate a model answer against the label set
    pub fn parse_model_response(&self, text: &str) -> Result<ModelVerdict> {
        let json = extract_json_object(text).ok_or_else(|| {
            AgentError::CategorizationError("Model response contains no JSON object".to_string())
        })?;

        let raw: RawVerdict = serde_json::from_str(json).map_err(|e| {
            AgentError::CategorizationError(format!("Invalid model response: {}", e))
        })?;

        let label_key = raw.label.trim().to_lowercase();
        if !self.labels.contains(&label_key) {
            return Err(AgentError::CategorizationError(format!(
                "Model chose unknown label '{}'",
                raw.label
            )));
        }

        Ok(ModelVerdict {
            label_key,
            confidence: raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            action_required: raw.action_required.unwrap_or(false),
            reasoning: raw.reasoning.filter(|r| !r.trim().is_empty()),
        })
    }

    async fn ask_model(&self, model: &dyn LanguageModel, message: &EmailMessage) -> Result<ModelVerdict> {
        let prompt = categorization_prompt(message, &self.labels);
        let response = model.complete(SYSTEM_PROMPT, &prompt).await?;
        self.parse_model_response(&response)
    }

    /// Categorize with whichever engine the configured mode calls for
    ///
    /// Never fails: model problems degrade to the rules result, marked
    /// [`CategorizationMethod::Fallback`].
    pub async fn categorize(&self, message: &EmailMessage) -> Categorization {
        let rules = self.categorize_with_rules(message);

        let model = match (self.settings.mode, &self.model) {
            (CategorizationMode::Rules, _) | (_, None) => return rules,
            (CategorizationMode::Hybrid, Some(_))
                if rules.confidence >= self.settings.confidence_threshold =>
            {
                return rules
            }
            (_, Some(model)) => model,
        };

        match self.ask_model(model.as_ref(), message).await {
            Ok(verdict) => Categorization {
                message_id: message.id.clone(),
                label_key: verdict.label_key,
                confidence: verdict.confidence,
                method: CategorizationMethod::Model,
                action_required: verdict.action_required || rules.action_required,
                reasoning: verdict.reasoning,
            },
            Err(e) => {
                tracing::warn!(
                    "Model {} failed for message {}: {}; using rules",
                    model.name(),
                    message.id,
                    e
                );
                Categorization {
                    method: CategorizationMethod::Fallback,
                    ..rules
                }
            }
        }
    }

    /// Categorize many messages with bounded concurrency, keeping input order
    pub async fn categorize_batch(
        &self,
        messages: &[EmailMessage],
        concurrency: usize,
    ) -> Vec<Categorization> {
        stream::iter(messages)
            .map(|message| self.categorize(message))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
