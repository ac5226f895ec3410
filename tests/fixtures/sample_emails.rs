//! A small inbox covering every kind of mail the default labels expect

use chrono::{Duration, TimeZone, Utc};
use gmail_categorizer_agent::models::EmailMessage;

struct Sample {
    id: &'static str,
    sender: &'static str,
    name: &'static str,
    subject: &'static str,
    snippet: &'static str,
    unsubscribe: bool,
    automated: bool,
}

const SAMPLES: &[Sample] = &[
    Sample {
        id: "invoice-1",
        sender: "billing@stripe.com",
        name: "Stripe",
        subject: "Your invoice for March",
        snippet: "Payment of $20.00 was received.",
        unsubscribe: false,
        automated: true,
    },
    Sample {
        id: "flight-1",
        sender: "reservations@united.com",
        name: "United Airlines",
        subject: "Your flight itinerary to Denver",
        snippet: "Check-in opens 24 hours before departure.",
        unsubscribe: false,
        automated: true,
    },
    Sample {
        id: "promo-1",
        sender: "deals@shop.example.com",
        name: "Example Shop",
        subject: "Big summer sale: 40% off everything",
        snippet: "Limited time offer, use coupon SUMMER.",
        unsubscribe: true,
        automated: true,
    },
    Sample {
        id: "newsletter-1",
        sender: "hello@techweekly.substack.com",
        name: "Tech Weekly",
        subject: "Tech Weekly: Issue #42",
        snippet: "This week's roundup of AI news.",
        unsubscribe: true,
        automated: true,
    },
    Sample {
        id: "github-1",
        sender: "notifications@github.com",
        name: "GitHub",
        subject: "[repo] New security alert for dependency",
        snippet: "A vulnerability was found. Review the alert.",
        unsubscribe: false,
        automated: true,
    },
    Sample {
        id: "work-1",
        sender: "alice@acme-corp.com",
        name: "Alice Chen",
        subject: "Project kickoff meeting agenda",
        snippet: "Please review the attached proposal before Thursday.",
        unsubscribe: false,
        automated: false,
    },
    Sample {
        id: "personal-1",
        sender: "mom@gmail.com",
        name: "Mom",
        subject: "Dinner this weekend?",
        snippet: "Let's celebrate your birthday with the family.",
        unsubscribe: false,
        automated: false,
    },
    Sample {
        id: "action-1",
        sender: "boss@acme-corp.com",
        name: "Dana Boss",
        subject: "Action required: sign the contract by Friday",
        snippet: "Signature required on page 3.",
        unsubscribe: false,
        automated: false,
    },
    Sample {
        id: "shipping-1",
        sender: "shipment-tracking@amazon.com",
        name: "Amazon",
        subject: "Your package has shipped",
        snippet: "Track your order: delivery expected Tuesday.",
        unsubscribe: false,
        automated: true,
    },
    Sample {
        id: "social-1",
        sender: "notification@facebookmail.com",
        name: "Facebook",
        subject: "Sam mentioned you in a comment",
        snippet: "Sam commented: great photo!",
        unsubscribe: false,
        automated: true,
    },
    Sample {
        id: "unknown-1",
        sender: "friend@example.org",
        name: "Old Friend",
        subject: "Hey",
        snippet: "Long time no see!",
        unsubscribe: false,
        automated: false,
    },
];

fn build(sample: &Sample, index: usize) -> EmailMessage {
    let base = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
    EmailMessage {
        id: sample.id.to_string(),
        thread_id: format!("thread-{}", sample.id),
        sender_email: sample.sender.to_string(),
        sender_domain: sample.sender.split('@').nth(1).unwrap_or_default().to_string(),
        sender_name: sample.name.to_string(),
        subject: sample.subject.to_string(),
        snippet: sample.snippet.to_string(),
        recipients: vec!["me@example.com".to_string()],
        date_received: base + Duration::minutes(index as i64 * 10),
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
        has_unsubscribe: sample.unsubscribe,
        is_automated: sample.automated,
    }
}

/// Every sample, oldest first
pub fn all() -> Vec<EmailMessage> {
    SAMPLES
        .iter()
        .enumerate()
        .map(|(i, s)| build(s, i))
        .collect()
}

pub fn by_id(id: &str) -> EmailMessage {
    all()
        .into_iter()
        .find(|m| m.id == id)
        .unwrap_or_else(|| panic!("no sample email with id {}", id))
}

/// Samples for the given ids, in the order asked
pub fn select(ids: &[String]) -> Vec<EmailMessage> {
    ids.iter().map(|id| by_id(id)).collect()
}
