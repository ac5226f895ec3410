//! Gmail API client with rate limiting and retry logic

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};
use google_gmail1::{
    api::{BatchModifyMessagesRequest, Label, LabelColor, Message},
    hyper_rustls, hyper_util, Gmail,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::models::EmailMessage;
use crate::utils::{
    extract_domain, extract_recipients, extract_sender_email, extract_sender_name,
    is_automated_sender, parse_email_date, strip_html,
};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";
const SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Gmail allows up to 1000 ids per batchModify call
const BATCH_SIZE: usize = 1000;
const API_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Trait defining the Gmail operations the agent needs, so tests can mock them
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// Address of the authenticated account
    async fn profile_email(&self) -> Result<String>;

    /// List up to `max_results` message ids matching a Gmail search query
    async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

    async fn get_message(&self, id: &str) -> Result<EmailMessage>;

    /// Fetch several messages concurrently, preserving input order
    async fn fetch_messages(&self, ids: Vec<String>) -> Result<Vec<EmailMessage>>;

    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a label with background and text colors, returning its id
    async fn create_label(&self, name: &str, background: &str, text: &str) -> Result<String>;

    /// Add and remove labels on many messages, returning how many were modified
    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<usize>;

    /// Send an RFC 822 message, returning the sent message id
    async fn send_raw_message(&self, raw: Vec<u8>) -> Result<String>;
}

/// Production Gmail client
///
/// A semaphore bounds concurrent requests; transient failures are retried
/// with exponential backoff capped at 30 seconds.
pub struct ProductionGmailClient {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>,
    rate_limiter: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ProductionGmailClient {
    pub fn new(
        hub: Gmail<
            hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
        >,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    async fn fetch_single(&self, id: &str) -> Result<EmailMessage> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            AgentError::Unknown(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        let resource = format!("message {}", id);
        Self::with_retry("get_message", MAX_RETRIES, || async {
            let (_, msg) = Self::with_timeout("get_message", async {
                self.hub
                    .users()
                    .messages_get("me", id)
                    .format("metadata")
                    .add_metadata_headers("From")
                    .add_metadata_headers("To")
                    .add_metadata_headers("Subject")
                    .add_metadata_headers("Date")
                    .add_metadata_headers("List-Unsubscribe")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| AgentError::gmail(&resource, e))
            })
            .await?;
            parse_message(msg)
        })
        .await
    }

    fn should_retry(error: &AgentError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    if let AgentError::RateLimitExceeded { retry_after } = e {
                        delay = delay.max(Duration::from_secs(retry_after));
                    }
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max_retries + 1, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Bound an API call so a stalled connection cannot hang the run
    async fn with_timeout<T, Fut>(operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(API_TIMEOUT, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, API_TIMEOUT);
                Err(AgentError::timeout(operation_name, API_TIMEOUT))
            }
        }
    }
}

/// Convert a metadata-format Gmail message into an [`EmailMessage`]
fn parse_message(msg: Message) -> Result<EmailMessage> {
    let id = msg
        .id
        .ok_or_else(|| AgentError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| AgentError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let labels = msg.label_ids.unwrap_or_default();
    // Snippets come back HTML-escaped ("Tom &amp; Jerry&#39;s")
    let snippet = strip_html(&msg.snippet.unwrap_or_default());

    let headers = msg
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_ref())
        .ok_or_else(|| AgentError::InvalidMessageFormat("Missing headers".to_string()))?;

    let mut sender_email = String::new();
    let mut sender_name = String::new();
    let mut subject = String::new();
    let mut recipients = Vec::new();
    let mut date_str = String::new();
    let mut has_unsubscribe = false;

    for header in headers {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            match name.to_lowercase().as_str() {
                "from" => {
                    sender_email = extract_sender_email(value).unwrap_or_else(|| value.trim().to_string());
                    sender_name = extract_sender_name(value).unwrap_or_default();
                }
                "subject" => subject = value.clone(),
                "to" | "cc" => recipients.extend(extract_recipients(value)),
                "date" => date_str = value.clone(),
                "list-unsubscribe" => has_unsubscribe = true,
                _ => {}
            }
        }
    }

    let sender_domain = extract_domain(&sender_email).unwrap_or_default();

    // Gmail's internal date is the receive time in epoch millis; the Date
    // header is the sender's claim and only a fallback
    let date_received = msg
        .internal_date
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .or_else(|| parse_email_date(&date_str))
        .unwrap_or_else(Utc::now);

    let is_automated = is_automated_sender(&sender_email, &sender_name, has_unsubscribe);

    Ok(EmailMessage {
        id,
        thread_id,
        sender_email,
        sender_domain,
        sender_name,
        subject,
        snippet,
        recipients,
        date_received,
        labels,
        has_unsubscribe,
        is_automated,
    })
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn profile_email(&self) -> Result<String> {
        Self::with_retry("get_profile", MAX_RETRIES, || async {
            let (_, profile) = Self::with_timeout("get_profile", async {
                self.hub
                    .users()
                    .get_profile("me")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| AgentError::gmail("profile", e))
            })
            .await?;

            profile
                .email_address
                .ok_or_else(|| AgentError::ApiError("Profile has no email address".to_string()))
        })
        .await
    }

    async fn list_message_ids(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        while all_ids.len() < max_results {
            let page_size = (max_results - all_ids.len()).min(500) as u32;
            let token = page_token.clone();

            let (_, response) = Self::with_retry("list_messages", MAX_RETRIES, || {
                let token = token.clone();
                async move {
                    Self::with_timeout("list_messages", async {
                        let mut call = self
                            .hub
                            .users()
                            .messages_list("me")
                            .q(query)
                            .max_results(page_size);
                        if let Some(token) = token.as_ref() {
                            call = call.page_token(token);
                        }
                        call.add_scope(MODIFY_SCOPE)
                            .doit()
                            .await
                            .map_err(|e| AgentError::gmail("message list", e))
                    })
                    .await
                }
            })
            .await?;

            all_ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(max_results);
        debug!("Query '{}' matched {} messages", query, all_ids.len());
        Ok(all_ids)
    }

    async fn get_message(&self, id: &str) -> Result<EmailMessage> {
        self.fetch_single(id).await
    }

    async fn fetch_messages(&self, ids: Vec<String>) -> Result<Vec<EmailMessage>> {
        // `buffered` keeps results in request order
        let results: Vec<(String, Result<EmailMessage>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.fetch_single(&id).await;
                (id, result)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        keep_fetched(results)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", MAX_RETRIES, || async {
            let (_, response) = Self::with_timeout("list_labels", async {
                self.hub
                    .users()
                    .labels_list("me")
                    .add_scope(LABELS_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| AgentError::gmail("label list", e))
            })
            .await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str, background: &str, text: &str) -> Result<String> {
        let resource = format!("label {}", name);
        Self::with_retry("create_label", MAX_RETRIES, || async {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                color: Some(LabelColor {
                    background_color: Some(background.to_string()),
                    text_color: Some(text.to_string()),
                }),
                ..Default::default()
            };

            let (_, created_label) = Self::with_timeout("create_label", async {
                self.hub
                    .users()
                    .labels_create(label, "me")
                    .add_scope(LABELS_SCOPE)
                    .doit()
                    .await
                    .map_err(|e| AgentError::gmail(&resource, e))
            })
            .await?;

            created_label
                .id
                .ok_or_else(|| AgentError::LabelError("Created label has no ID".to_string()))
        })
        .await
    }

    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<usize> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let add_labels = (!add_label_ids.is_empty()).then(|| add_label_ids.to_vec());
        let remove_labels = (!remove_label_ids.is_empty()).then(|| remove_label_ids.to_vec());
        let mut total_modified = 0;

        for chunk in message_ids.chunks(BATCH_SIZE) {
            Self::with_retry("batch_modify_labels", MAX_RETRIES, || async {
                let request = BatchModifyMessagesRequest {
                    ids: Some(chunk.to_vec()),
                    add_label_ids: add_labels.clone(),
                    remove_label_ids: remove_labels.clone(),
                };

                Self::with_timeout("batch_modify_labels", async {
                    self.hub
                        .users()
                        .messages_batch_modify(request, "me")
                        .add_scope(MODIFY_SCOPE)
                        .doit()
                        .await
                        .map_err(|e| AgentError::gmail("message batch", e))
                })
                .await?;

                Ok(())
            })
            .await?;

            total_modified += chunk.len();
        }

        Ok(total_modified)
    }

    async fn send_raw_message(&self, raw: Vec<u8>) -> Result<String> {
        let content_type = rfc822()?;

        let (_, sent) = Self::with_retry("send_message", MAX_RETRIES, || {
            let body = std::io::Cursor::new(raw.clone());
            let content_type = content_type.clone();
            async move {
                Self::with_timeout("send_message", async {
                    self.hub
                        .users()
                        .messages_send(Message::default(), "me")
                        .add_scope(SEND_SCOPE)
                        .upload(body, content_type)
                        .await
                        .map_err(|e| AgentError::gmail("summary email", e))
                })
                .await
            }
        })
        .await?;

        sent.id
            .ok_or_else(|| AgentError::DeliveryError("Sent message has no ID".to_string()))
    }
}

/// Media type of a raw message handed to the `messages.send` upload endpoint
fn rfc822() -> Result<mime::Mime> {
    "message/rfc822"
        .parse()
        .map_err(|e| AgentError::DeliveryError(format!("Invalid upload media type: {}", e)))
}

/// Keep successfully fetched messages in order, logging the ones that failed
///
/// A message can vanish between listing and fetching, or arrive without
/// headers; those are skipped so the rest of the batch is still categorized.
/// Authentication failures affect every message and abort the batch.
fn keep_fetched(results: Vec<(String, Result<EmailMessage>)>) -> Result<Vec<EmailMessage>> {
    let mut messages = Vec::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(message) => messages.push(message),
            Err(e @ AgentError::AuthError(_)) => return Err(e),
            Err(e) => warn!("Skipping message {}: {}", id, e),
        }
    }
    Ok(messages)
}
