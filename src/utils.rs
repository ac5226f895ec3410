//! Small helpers shared across the agent: header parsing, text cleanup and
//! Gmail query construction

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").unwrap());

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static HTML_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const AUTOMATED_KEYWORDS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "do-not-reply",
    "notification",
    "automated",
    "mailer",
    "robot",
];

/// Extract the address from a From header ("Name <a@b.com>" or bare address)
pub fn extract_sender_email(from_header: &str) -> Option<String> {
    EMAIL_ADDRESS
        .captures(from_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Extract the display name from a From header
pub fn extract_sender_name(from_header: &str) -> Option<String> {
    let pos = from_header.find('<')?;
    let name = from_header[..pos].trim().trim_matches('"').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn extract_domain(email: &str) -> Option<String> {
    email
        .split('@')
        .nth(1)
        .filter(|d| !d.is_empty())
        .map(|d| d.to_lowercase())
}

/// Extract every address in a To/Cc header
pub fn extract_recipients(header: &str) -> Vec<String> {
    EMAIL_ADDRESS
        .captures_iter(header)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Parse an email Date header (RFC 2822 first, then RFC 3339)
pub fn parse_email_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();

    // Some mailers append a zone comment like "(UTC)"
    let without_comment = match trimmed.find(" (") {
        Some(pos) if trimmed.ends_with(')') => &trimmed[..pos],
        _ => trimmed,
    };

    DateTime::parse_from_rfc2822(without_comment)
        .or_else(|_| DateTime::parse_from_rfc3339(without_comment))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Truncate to `max_chars` characters, appending "..." when cut
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!(
            "{}...",
            s.chars().take(max_chars.saturating_sub(3)).collect::<String>()
        )
    }
}

pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}

/// Remove tags, scripts and styles from HTML and decode the common entities
pub fn strip_html(html: &str) -> String {
    let without_blocks = HTML_BLOCK.replace_all(html, " ");
    let without_tags = HTML_TAG.replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    normalize_whitespace(&decoded)
}

/// Build the inbox search query for messages received after `since`
pub fn build_inbox_query(since: DateTime<Utc>, extra: Option<&str>) -> String {
    let mut query = format!("in:inbox after:{}", since.timestamp());
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        query.push(' ');
        query.push_str(extra);
    }
    query
}

/// Heuristic check for machine-sent mail
pub fn is_automated_sender(sender_email: &str, sender_name: &str, has_unsubscribe: bool) -> bool {
    let email_lower = sender_email.to_lowercase();
    let name_lower = sender_name.to_lowercase();

    has_unsubscribe
        || AUTOMATED_KEYWORDS
            .iter()
            .any(|&keyword| email_lower.contains(keyword) || name_lower.contains(keyword))
}

/// Find the first balanced JSON object in free-form model output
///
/// Braces inside string literals are ignored, so `{"reasoning": "a } b"}`
/// is returned whole.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
