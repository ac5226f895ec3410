//! Gmail label definitions used for categorization
//!
//! Each label carries the rule hints the categorizer scores against
//! (subject keywords, sender local-part patterns, sender domains) and the
//! colors applied when the label is created in Gmail.

use once_cell::sync::OnceCell;
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::error::{AgentError, Result};

/// Key of the label used when nothing else matches
pub const FALLBACK_LABEL: &str = "other";

/// Key of the label for personal correspondence from real people
pub const PERSONAL_LABEL: &str = "personal";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelDefinition {
    /// Stable identifier, lowercase kebab-case (e.g. "action-required")
    pub key: String,
    /// Display name, becomes "{prefix}/{name}" in Gmail
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Sender local-part prefixes such as "billing@"
    #[serde(default)]
    pub sender_patterns: Vec<String>,
    /// Sender domains; subdomains match too
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    /// Higher wins ties during rule scoring
    #[serde(default)]
    pub priority: u8,
    #[serde(skip)]
    matcher: KeywordMatcher,
}

/// Keywords compiled into one case-insensitive set, built on first use
///
/// Clones start empty so an edited copy recompiles its own keywords.
#[derive(Debug, Default)]
struct KeywordMatcher(OnceCell<Option<RegexSet>>);

impl Clone for KeywordMatcher {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl PartialEq for KeywordMatcher {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

fn default_background_color() -> String {
    "#cccccc".to_string()
}

fn default_text_color() -> String {
    "#000000".to_string()
}

impl LabelDefinition {
    fn builtin(
        key: &str,
        name: &str,
        description: &str,
        keywords: &[&str],
        sender_patterns: &[&str],
        domains: &[&str],
        colors: (&str, &str),
        priority: u8,
    ) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            keywords: owned(keywords),
            sender_patterns: owned(sender_patterns),
            domains: owned(domains),
            background_color: colors.0.to_string(),
            text_color: colors.1.to_string(),
            priority,
            matcher: KeywordMatcher::default(),
        }
    }

    /// Does `domain` equal or sit under one of this label's domains?
    pub fn matches_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.domains.iter().any(|d| {
            let d = d.to_lowercase();
            domain == d || domain.ends_with(&format!(".{}", d))
        })
    }

    pub fn matches_sender(&self, sender_email: &str) -> bool {
        let email = sender_email.to_lowercase();
        self.sender_patterns
            .iter()
            .any(|p| email.starts_with(&p.to_lowercase()))
    }

    /// Keywords present in `text` (case-insensitive, word-boundary aware)
    pub fn keyword_hits(&self, text: &str) -> usize {
        self.matcher
            .0
            .get_or_init(|| compile_keywords(&self.key, &self.keywords))
            .as_ref()
            .map_or(0, |set| set.matches(text).iter().count())
    }
}

/// One pattern per keyword: "sale" matches "big sale!" but not "wholesale"
///
/// Only edges that are word characters get a `\b`, so "% off" still matches
/// after a number.
fn keyword_pattern(keyword: &str) -> String {
    let is_word = |c: Option<char>| c.map_or(false, char::is_alphanumeric);
    let start = if is_word(keyword.chars().next()) { r"\b" } else { "" };
    let end = if is_word(keyword.chars().next_back()) { r"\b" } else { "" };
    format!("{}{}{}", start, regex::escape(keyword), end)
}

fn compile_keywords(key: &str, keywords: &[String]) -> Option<RegexSet> {
    let patterns: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(keyword_pattern)
        .collect();

    match RegexSetBuilder::new(&patterns).case_insensitive(true).build() {
        Ok(set) => Some(set),
        Err(e) => {
            warn!("Keywords of label '{}' did not compile, ignoring them: {}", key, e);
            None
        }
    }
}

/// Ordered collection of label definitions
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    labels: Vec<LabelDefinition>,
}

impl LabelSet {
    pub fn new(labels: Vec<LabelDefinition>) -> Result<Self> {
        let set = Self { labels };
        set.validate()?;
        Ok(set)
    }

    /// Labels the agent ships with
    pub fn defaults() -> Self {
        Self {
            labels: default_labels(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&LabelDefinition> {
        self.labels.iter().find(|l| l.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.key.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelDefinition> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Position of a label in the set, used as the final tie breaker
    pub fn position(&self, key: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.key == key)
    }

    /// The catch-all label, when the set has one
    pub fn fallback(&self) -> Option<&LabelDefinition> {
        self.get(FALLBACK_LABEL)
    }

    /// Full Gmail label name for a key, e.g. "AI/Finance"
    pub fn gmail_name(&self, prefix: &str, key: &str) -> Option<String> {
        self.get(key).map(|l| format!("{}/{}", prefix, l.name))
    }

    /// Add custom labels; a custom label with an existing key replaces it
    pub fn merge(mut self, custom: &[LabelDefinition]) -> Result<Self> {
        for label in custom {
            match self.labels.iter_mut().find(|l| l.key == label.key) {
                Some(existing) => *existing = label.clone(),
                None => self.labels.push(label.clone()),
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(AgentError::ConfigError(
                "label set cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.key.is_empty() || label.name.trim().is_empty() {
                return Err(AgentError::ConfigError(
                    "labels must have a non-empty key and name".to_string(),
                ));
            }
            if label.key != label.key.to_lowercase() || label.key.contains(char::is_whitespace) {
                return Err(AgentError::ConfigError(format!(
                    "label key '{}' must be lowercase without spaces",
                    label.key
                )));
            }
            if label.name.contains('/') {
                return Err(AgentError::ConfigError(format!(
                    "label name '{}' cannot contain '/'",
                    label.name
                )));
            }
            if !seen.insert(label.key.as_str()) {
                return Err(AgentError::ConfigError(format!(
                    "duplicate label key '{}'",
                    label.key
                )));
            }
        }

        if !self.contains(FALLBACK_LABEL) {
            return Err(AgentError::ConfigError(format!(
                "label set must contain the '{}' label",
                FALLBACK_LABEL
            )));
        }

        Ok(())
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::defaults()
    }
}

fn default_labels() -> Vec<LabelDefinition> {
    vec![
        LabelDefinition::builtin(
            "action-required",
            "Action Required",
            "Emails that need a reply, decision, signature or other action from the user",
            &[
                "action required",
                "please respond",
                "please reply",
                "urgent",
                "deadline",
                "rsvp",
                "please sign",
                "signature required",
                "approval needed",
                "awaiting your",
            ],
            &[],
            &[],
            ("#fb4c2f", "#ffffff"),
            90,
        ),
        LabelDefinition::builtin(
            "work",
            "Work",
            "Work and professional communication: meetings, projects, colleagues, clients",
            &[
                "meeting",
                "project",
                "standup",
                "sprint",
                "review",
                "proposal",
                "agenda",
                "quarterly",
                "interview",
                "contract",
            ],
            &[],
            &["slack.com", "atlassian.net", "zoom.us", "calendly.com"],
            ("#4a86e8", "#ffffff"),
            70,
        ),
        LabelDefinition::builtin(
            PERSONAL_LABEL,
            "Personal",
            "Personal messages from friends and family",
            &["family", "birthday", "dinner", "weekend", "congratulations"],
            &[],
            &[],
            ("#16a766", "#ffffff"),
            60,
        ),
        LabelDefinition::builtin(
            "finance",
            "Finance",
            "Banking, bills, invoices, payments, taxes and statements",
            &[
                "invoice",
                "statement",
                "payment",
                "bank",
                "balance",
                "tax",
                "bill",
                "transfer",
                "credit card",
                "payment due",
            ],
            &["billing@", "invoices@", "finance@", "accounts@", "payments@"],
            &["paypal.com", "stripe.com", "chase.com", "wise.com", "venmo.com"],
            ("#ffad47", "#000000"),
            80,
        ),
        LabelDefinition::builtin(
            "shopping",
            "Shopping",
            "Orders, receipts, shipping and delivery updates",
            &[
                "order",
                "receipt",
                "shipped",
                "shipping",
                "delivered",
                "delivery",
                "tracking",
                "purchase",
                "your package",
            ],
            &["orders@", "order-update@", "shipment-tracking@"],
            &["amazon.com", "ebay.com", "etsy.com", "shopify.com", "ups.com", "fedex.com"],
            ("#a479e2", "#ffffff"),
            50,
        ),
        LabelDefinition::builtin(
            "travel",
            "Travel",
            "Flights, hotels, reservations, itineraries and boarding passes",
            &[
                "flight",
                "boarding pass",
                "itinerary",
                "reservation",
                "booking",
                "hotel",
                "check-in",
                "trip",
            ],
            &["reservations@", "booking@"],
            &["booking.com", "airbnb.com", "expedia.com", "united.com", "delta.com"],
            ("#43d692", "#000000"),
            55,
        ),
        LabelDefinition::builtin(
            "social",
            "Social",
            "Social network activity: mentions, friend requests, comments",
            &["mentioned you", "friend request", "commented", "new follower", "tagged you"],
            &[],
            &[
                "facebookmail.com",
                "facebook.com",
                "twitter.com",
                "x.com",
                "linkedin.com",
                "instagram.com",
            ],
            ("#f691b3", "#000000"),
            30,
        ),
        LabelDefinition::builtin(
            "newsletters",
            "Newsletters",
            "Newsletters, digests and subscribed content",
            &["newsletter", "digest", "weekly", "monthly", "roundup", "edition", "issue"],
            &["newsletter@", "news@", "digest@", "updates@"],
            &["substack.com", "mailchimp.com", "beehiiv.com"],
            ("#fad165", "#000000"),
            20,
        ),
        LabelDefinition::builtin(
            "promotions",
            "Promotions",
            "Marketing, sales, discounts and offers",
            &[
                "sale",
                "discount",
                "offer",
                "deal",
                "promo",
                "coupon",
                "limited time",
                "exclusive",
                "% off",
                "free shipping",
            ],
            &["marketing@", "promo@", "promotions@", "deals@", "offers@"],
            &[],
            ("#ffd6a2", "#000000"),
            10,
        ),
        LabelDefinition::builtin(
            "notifications",
            "Notifications",
            "Automated notifications, alerts, security and account messages",
            &[
                "notification",
                "alert",
                "reminder",
                "verify",
                "security",
                "password",
                "sign-in",
                "login",
                "confirm your",
            ],
            &["notifications@", "notify@", "alerts@", "no-reply@", "noreply@"],
            &["github.com", "gitlab.com", "google.com", "apple.com"],
            ("#666666", "#ffffff"),
            40,
        ),
        LabelDefinition::builtin(
            FALLBACK_LABEL,
            "Other",
            "Anything that does not clearly fit another label",
            &[],
            &[],
            &[],
            ("#cccccc", "#000000"),
            0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels_valid() {
        let set = LabelSet::defaults();
        assert!(set.validate().is_ok());
        assert_eq!(set.len(), 11);
        assert_eq!(set.keys()[0], "action-required");
        assert!(set.contains(FALLBACK_LABEL));
        assert_eq!(set.fallback().map(|l| l.name.as_str()), Some("Other"));
    }

    #[test]
    fn test_gmail_name() {
        let set = LabelSet::defaults();
        assert_eq!(set.gmail_name("AI", "finance"), Some("AI/Finance".to_string()));
        assert_eq!(
            set.gmail_name("AI", "action-required"),
            Some("AI/Action Required".to_string())
        );
        assert_eq!(set.gmail_name("AI", "missing"), None);
    }

    #[test]
    fn test_keyword_hits_respect_word_boundaries() {
        let set = LabelSet::defaults();
        let promotions = set.get("promotions").unwrap();
        assert_eq!(promotions.keyword_hits("Big SALE this weekend"), 1);
        assert_eq!(promotions.keyword_hits("Wholesale pricing update"), 0);
        assert_eq!(promotions.keyword_hits("Exclusive deal: 20% off"), 3);
    }

    #[test]
    fn test_keyword_pattern_escapes_and_bounds_word_edges() {
        assert_eq!(keyword_pattern("sale"), r"\bsale\b");
        assert_eq!(keyword_pattern("% off"), r"% off\b");
        assert_eq!(keyword_pattern("check-in"), r"\bcheck\-in\b");
    }

    #[test]
    fn test_keyword_hits_follow_edited_keywords() {
        let travel = LabelSet::defaults().get("travel").unwrap().clone();
        assert_eq!(travel.keyword_hits("Your boarding pass"), 1);

        let mut custom = travel.clone();
        custom.keywords = vec!["  ".to_string(), "layover".to_string(), "C++".to_string()];
        assert_eq!(custom.keyword_hits("Your boarding pass"), 0);
        assert_eq!(custom.keyword_hits("2h LAYOVER in Denver, bring c++ book"), 2);
        assert_eq!(custom, custom.clone());
    }

    #[test]
    fn test_matches_domain_includes_subdomains() {
        let set = LabelSet::defaults();
        let shopping = set.get("shopping").unwrap();
        assert!(shopping.matches_domain("amazon.com"));
        assert!(shopping.matches_domain("marketplace.Amazon.com"));
        assert!(!shopping.matches_domain("notamazon.com"));
    }

    #[test]
    fn test_matches_sender() {
        let set = LabelSet::defaults();
        let finance = set.get("finance").unwrap();
        assert!(finance.matches_sender("Billing@acme.io"));
        assert!(!finance.matches_sender("bob@acme.io"));
    }

    #[test]
    fn test_merge_replaces_and_appends() {
        let mut custom_finance = LabelSet::defaults().get("finance").unwrap().clone();
        custom_finance.name = "Money".to_string();

        let school: LabelDefinition = toml::from_str(
            r#"
key = "school"
name = "School"
description = "Messages from school"
keywords = ["homework", "tutor"]
"#,
        )
        .unwrap();

        let merged = LabelSet::defaults()
            .merge(&[custom_finance, school])
            .unwrap();

        assert_eq!(merged.len(), 12);
        assert_eq!(merged.get("finance").unwrap().name, "Money");
        assert_eq!(merged.position("finance"), LabelSet::defaults().position("finance"));
        let school = merged.get("school").unwrap();
        assert_eq!(school.background_color, "#cccccc");
        assert_eq!(school.priority, 0);
    }

    #[test]
    fn test_validate_rejects_bad_sets() {
        let mut labels = default_labels();
        labels.push(labels[1].clone());
        assert!(LabelSet::new(labels).is_err());

        let mut labels = default_labels();
        labels[1].key = "Work Stuff".to_string();
        assert!(LabelSet::new(labels).is_err());

        let mut labels = default_labels();
        labels[1].name = "Work/Projects".to_string();
        assert!(LabelSet::new(labels).is_err());

        let labels: Vec<_> = default_labels()
            .into_iter()
            .filter(|l| l.key != FALLBACK_LABEL)
            .collect();
        assert!(LabelSet::new(labels).is_err());

        assert!(LabelSet::new(Vec::new()).is_err());
    }
}
