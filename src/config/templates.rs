//! Rendering of summary digests and the outgoing summary email
//!
//! Both digests are tera templates over the same [`DigestView`]; the HTML one
//! is registered under a `.html` name so every value is escaped on output.

use lettre::message::{Mailbox, MultiPart};
use lettre::Message;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::labels::LabelSet;
use crate::error::{AgentError, Result};
use crate::models::{DigestEntry, Summary, SummaryPeriod};
use crate::utils::truncate_chars;

const MAX_SUBJECT_CHARS: usize = 90;

const TEXT_TEMPLATE_NAME: &str = "summary.txt";
const HTML_TEMPLATE_NAME: &str = "summary.html";

const TEXT_TEMPLATE: &str = r##"{{ title }} Email Digest
{{ window_start }} to {{ generated_at }} (UTC)
========================================

{% if empty %}No new emails were categorized in this period.
{% else %}Total categorized: {{ total }}

{% if has_highlights %}Highlights
----------
{{ highlights }}

{% endif %}{% if action_count > 0 %}Needs action ({{ action_count }})
----------------
{% for item in action_items %}  * {{ item.sender }}: {{ item.subject }}
{% endfor %}
{% endif %}By label
--------
{% for row in label_rows %}{{ row.name_col }} {{ row.count_col }}
{% for example in row.examples %}    - {{ example.sender }}: {{ example.subject }}
{% endfor %}{% endfor %}{% if has_top_senders %}
Top senders
-----------
{% for sender in top_senders %}{{ sender.count_col }}  {{ sender.email }}
{% endfor %}{% endif %}{% endif %}"##;

const HTML_TEMPLATE: &str = r##"<!DOCTYPE html>
<html><body style="font-family: sans-serif;">
<h2>{{ title }} Email Digest</h2>
<p style="color:#666">{{ window_start }} to {{ generated_at }} (UTC)</p>
{% if empty %}<p>No new emails were categorized in this period.</p>
{% else %}<p><strong>Total categorized:</strong> {{ total }}</p>
{% if has_highlights %}<h3>Highlights</h3>
<ul>
{% for line in highlight_lines %}<li>{{ line }}</li>
{% endfor %}</ul>
{% endif %}{% if action_count > 0 %}<h3>Needs action ({{ action_count }})</h3>
<ul>
{% for item in action_items %}<li><strong>{{ item.sender }}</strong>: {{ item.subject }}</li>
{% endfor %}</ul>
{% endif %}<h3>By label</h3>
<table cellpadding="4">
{% for row in label_rows %}<tr><td style="background:{{ row.background }};color:{{ row.text }}">{{ row.name }}</td><td align="right">{{ row.count }}</td></tr>
{% for example in row.examples %}<tr><td></td><td>{{ example.sender }}: {{ example.subject }}</td></tr>
{% endfor %}{% endfor %}</table>
{% if has_top_senders %}<h3>Top senders</h3>
<ol>
{% for sender in top_senders %}<li>{{ sender.email }} ({{ sender.count }})</li>
{% endfor %}</ol>
{% endif %}{% endif %}</body></html>
"##;

static ENGINE: OnceCell<Tera> = OnceCell::new();

fn engine() -> Result<&'static Tera> {
    ENGINE.get_or_try_init(|| {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (TEXT_TEMPLATE_NAME, TEXT_TEMPLATE),
            (HTML_TEMPLATE_NAME, HTML_TEMPLATE),
        ])
        .map_err(|e| AgentError::TemplateError(format!("Failed to load digest templates: {}", e)))?;
        Ok(tera)
    })
}

/// Everything the digest templates print, already formatted
#[derive(Serialize)]
struct DigestView<'a> {
    title: &'static str,
    window_start: String,
    generated_at: String,
    empty: bool,
    total: usize,
    has_highlights: bool,
    highlights: &'a str,
    highlight_lines: Vec<&'a str>,
    action_count: usize,
    action_items: Vec<EntryView<'a>>,
    label_rows: Vec<LabelRow<'a>>,
    has_top_senders: bool,
    top_senders: Vec<SenderRow<'a>>,
}

#[derive(Serialize)]
struct EntryView<'a> {
    sender: &'a str,
    subject: String,
}

#[derive(Serialize)]
struct LabelRow<'a> {
    name: &'a str,
    name_col: String,
    count: usize,
    count_col: String,
    background: &'a str,
    text: &'a str,
    examples: Vec<EntryView<'a>>,
}

#[derive(Serialize)]
struct SenderRow<'a> {
    email: &'a str,
    count: usize,
    count_col: String,
}

impl<'a> EntryView<'a> {
    fn new(entry: &'a DigestEntry) -> Self {
        Self {
            sender: &entry.sender_email,
            subject: truncate_chars(&entry.subject, MAX_SUBJECT_CHARS),
        }
    }
}

impl<'a> DigestView<'a> {
    fn new(summary: &'a Summary, labels: &'a LabelSet) -> Self {
        let highlights = summary.highlights.as_deref().map(str::trim).unwrap_or_default();
        let highlight_lines = highlights
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.trim_start_matches("- ").trim_start_matches("* "))
            .collect();

        let label_rows = summary
            .label_counts
            .iter()
            .map(|count| {
                let label = labels.get(&count.label_key);
                let name = label.map_or(count.label_key.as_str(), |l| l.name.as_str());
                LabelRow {
                    name,
                    name_col: format!("{:<18}", name),
                    count: count.count,
                    count_col: format!("{:>5}", count.count),
                    background: label.map_or("#cccccc", |l| l.background_color.as_str()),
                    text: label.map_or("#000000", |l| l.text_color.as_str()),
                    examples: count.examples.iter().map(EntryView::new).collect(),
                }
            })
            .collect();

        let top_senders: Vec<SenderRow> = summary
            .top_senders
            .iter()
            .map(|(email, count)| SenderRow {
                email,
                count: *count,
                count_col: format!("{:>5}", count),
            })
            .collect();

        Self {
            title: period_title(summary.period),
            window_start: summary.window_start.format("%Y-%m-%d %H:%M").to_string(),
            generated_at: summary.generated_at.format("%Y-%m-%d %H:%M").to_string(),
            empty: summary.is_empty(),
            total: summary.total,
            has_highlights: !highlights.is_empty(),
            highlights,
            highlight_lines,
            action_count: summary.action_items.len(),
            action_items: summary.action_items.iter().map(EntryView::new).collect(),
            label_rows,
            has_top_senders: !top_senders.is_empty(),
            top_senders,
        }
    }
}

fn period_title(period: SummaryPeriod) -> &'static str {
    match period {
        SummaryPeriod::Daily => "Daily",
        SummaryPeriod::Weekly => "Weekly",
    }
}

fn render(template: &str, summary: &Summary, labels: &LabelSet) -> Result<String> {
    let context = Context::from_serialize(DigestView::new(summary, labels))
        .map_err(|e| AgentError::TemplateError(format!("Invalid digest context: {}", e)))?;
    engine()?
        .render(template, &context)
        .map_err(|e| AgentError::TemplateError(format!("Failed to render {}: {}", template, e)))
}

pub fn summary_subject(summary: &Summary) -> String {
    let mut subject = format!(
        "{} email digest: {} new",
        period_title(summary.period),
        summary.total
    );
    if !summary.action_items.is_empty() {
        subject.push_str(&format!(", {} need action", summary.action_items.len()));
    }
    subject.push_str(&format!(" ({})", summary.generated_at.format("%b %-d")));
    subject
}

/// Plain-text digest
pub fn render_summary_text(summary: &Summary, labels: &LabelSet) -> Result<String> {
    render(TEXT_TEMPLATE_NAME, summary, labels)
}

pub fn render_summary_html(summary: &Summary, labels: &LabelSet) -> Result<String> {
    render(HTML_TEMPLATE_NAME, summary, labels)
}

/// Build a multipart/alternative RFC 822 message ready for `messages.send`
pub fn build_raw_email(from: &str, to: &str, subject: &str, text: &str, html: &str) -> Result<Vec<u8>> {
    let mailbox = |address: &str| {
        address
            .parse::<Mailbox>()
            .map_err(|e| AgentError::DeliveryError(format!("Invalid address '{}': {}", address, e)))
    };

    let message = Message::builder()
        .from(mailbox(from)?)
        .to(mailbox(to)?)
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(
            text.to_string(),
            html.to_string(),
        ))
        .map_err(|e| AgentError::DeliveryError(format!("Failed to build summary email: {}", e)))?;

    Ok(message.formatted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelCount;
    use chrono::{Duration, TimeZone, Utc};

    fn summary_with_items() -> Summary {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        let entry = DigestEntry {
            sender_email: "boss@corp.com".to_string(),
            subject: "Q1 <budget> review".to_string(),
            received_at: now,
            label_key: "work".to_string(),
        };
        Summary {
            period: SummaryPeriod::Daily,
            generated_at: now,
            window_start: now - Duration::hours(24),
            total: 3,
            label_counts: vec![
                LabelCount {
                    label_key: "work".to_string(),
                    count: 2,
                    examples: vec![entry.clone()],
                },
                LabelCount {
                    label_key: "promotions".to_string(),
                    count: 1,
                    examples: vec![],
                },
            ],
            action_items: vec![entry],
            top_senders: vec![("boss@corp.com".to_string(), 2)],
            highlights: Some("- Budget review needs your input".to_string()),
        }
    }

    #[test]
    fn test_summary_subject() {
        let summary = summary_with_items();
        assert_eq!(
            summary_subject(&summary),
            "Daily email digest: 3 new, 1 need action (Mar 5)"
        );
    }

    #[test]
    fn test_render_text() {
        let labels = LabelSet::defaults();
        let text = render_summary_text(&summary_with_items(), &labels).unwrap();

        assert!(text.starts_with("Daily Email Digest\n2024-03-04 08:00 to 2024-03-05 08:00 (UTC)\n"));
        assert!(text.contains("Total categorized: 3\n"));
        assert!(text.contains("Needs action (1)\n----------------\n  * boss@corp.com: Q1 <budget> review\n\nBy label"));
        assert!(text.contains("Work                   2\n    - boss@corp.com: Q1 <budget> review\n"));
        assert!(text.contains("Promotions             1\n"));
        assert!(text.contains("Highlights\n----------\n- Budget review needs your input\n\n"));
        assert!(text.ends_with("\nTop senders\n-----------\n    2  boss@corp.com\n"));
    }

    #[test]
    fn test_render_text_without_optional_sections() {
        let labels = LabelSet::defaults();
        let mut summary = summary_with_items();
        summary.action_items.clear();
        summary.top_senders.clear();
        summary.highlights = Some("   ".to_string());

        let text = render_summary_text(&summary, &labels).unwrap();
        assert!(text.contains("Total categorized: 3\n\nBy label\n--------\n"));
        assert!(!text.contains("Highlights"));
        assert!(!text.contains("Needs action"));
        assert!(!text.contains("Top senders"));
    }

    #[test]
    fn test_render_empty_summary() {
        let labels = LabelSet::defaults();
        let mut summary = summary_with_items();
        summary.total = 0;
        summary.label_counts.clear();
        summary.action_items.clear();

        let text = render_summary_text(&summary, &labels).unwrap();
        assert!(text.ends_with("========================================\n\nNo new emails were categorized in this period.\n"));
        assert!(!text.contains("By label"));

        let html = render_summary_html(&summary, &labels).unwrap();
        assert!(html.contains("<p>No new emails were categorized in this period.</p>"));
        assert!(!html.contains("<table"));
    }

    #[test]
    fn test_render_html_escapes_email_text() {
        let labels = LabelSet::defaults();
        let mut summary = summary_with_items();
        summary.highlights = Some("- Reply to <script>alert(1)</script>\n* Pay rent".to_string());
        let html = render_summary_html(&summary, &labels).unwrap();

        assert!(html.contains("Q1 &lt;budget&gt; review"));
        assert!(!html.contains("<budget>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<li>Pay rent</li>"));
        assert!(html.contains("<li><strong>boss@corp.com</strong>: Q1 &lt;budget&gt; review</li>"));
        assert!(html.contains("background:#4a86e8"));
        assert!(html.contains("<li>boss@corp.com (2)</li>"));
    }

    #[test]
    fn test_build_raw_email() {
        let raw = build_raw_email(
            "me@example.com",
            "me@example.com",
            "Daily digest ✉",
            "hello",
            "<p>hello</p>",
        )
        .unwrap();
        let raw = String::from_utf8(raw).unwrap();

        assert!(raw.lines().any(|l| l.starts_with("From: ") && l.contains("me@example.com")));
        assert!(raw.lines().any(|l| l.starts_with("To: ") && l.contains("me@example.com")));
        // non-ASCII subjects are header-encoded
        assert!(raw.lines().any(|l| l.starts_with("Subject: ")));
        assert!(!raw.contains('✉'));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain; charset=utf-8"));
        assert!(raw.contains("text/html; charset=utf-8"));
    }

    #[test]
    fn test_build_raw_email_rejects_bad_address() {
        let result = build_raw_email("not an address", "me@example.com", "Hi", "x", "<p>x</p>");
        assert!(matches!(result, Err(AgentError::DeliveryError(_))));
    }
}
