//! Labels the default rules should give each sample email

/// (message id, label key)
pub const EXPECTED_LABELS: &[(&str, &str)] = &[
    ("invoice-1", "finance"),
    ("flight-1", "travel"),
    ("promo-1", "promotions"),
    ("newsletter-1", "newsletters"),
    ("github-1", "notifications"),
    ("work-1", "work"),
    ("personal-1", "personal"),
    ("action-1", "action-required"),
    ("shipping-1", "shopping"),
    ("social-1", "social"),
    ("unknown-1", "personal"),
];

/// Samples that ask the reader to do something
pub const ACTION_REQUIRED: &[&str] = &["work-1", "action-1"];

/// Samples no rule matches; they land on a fallback label with low confidence
pub const UNMATCHED: &[&str] = &["unknown-1"];

pub fn expected_label(id: &str) -> &'static str {
    EXPECTED_LABELS
        .iter()
        .find(|(msg, _)| *msg == id)
        .map(|(_, label)| *label)
        .unwrap_or_else(|| panic!("no expected label for {}", id))
}
