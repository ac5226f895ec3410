//! Gmail Categorizer Agent
//!
//! An email management agent that sorts incoming Gmail messages into a fixed
//! set of labels and produces periodic summaries of what arrived.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with token caching
//! - **Categorization**: weighted keyword and sender rules, optionally
//!   backed by a language model for uncertain messages
//! - **Labeling**: hierarchical `{prefix}/{Label}` labels applied in batches,
//!   with optional archiving of bulk categories
//! - **Summaries**: daily or weekly digests printed, written to disk, or
//!   emailed to the account owner
//! - **State**: processed message ids and categorization history in JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_categorizer_agent::{auth, agent::CategorizerAgent, config::Config};
//! use gmail_categorizer_agent::gmail_client::ProductionGmailClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::authenticate(
//!         "credentials.json".as_ref(),
//!         ".gmail-categorizer/token.json".as_ref(),
//!         false,
//!     )
//!     .await?;
//!     let client = ProductionGmailClient::new(hub, config.gmail.max_concurrent_requests);
//!
//!     let mut agent =
//!         CategorizerAgent::new(client, config, None, ".gmail-categorizer/state.json").await?;
//!     let report = agent.run_once().await?;
//!     println!("categorized {} messages", report.categorized);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`agent`] - Run loop, labeling and summary delivery
//! - [`categorizer`] - Rule and model based categorization
//! - [`gmail_client`] - Rate-limited Gmail API client with retry logic
//! - [`config`] - Configuration plus [`config::prompts`], [`config::labels`]
//!   and [`config::templates`]
//! - [`utils`] - Header parsing and text helpers
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`cli`] - Command-line definitions and report formatting
//! - [`error`] - Error types and result aliases
//! - [`llm`] - Language model seam
//! - [`models`] - Core data structures
//! - [`state`] - Persistent agent state

pub mod agent;
pub mod auth;
pub mod categorizer;
pub mod cli;
pub mod config;
pub mod error;
pub mod gmail_client;
pub mod llm;
pub mod models;
pub mod state;
pub mod utils;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate authors
pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

/// Crate description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

pub use error::{AgentError, Result};

pub use models::{
    Categorization, CategorizationMethod, CategorizationRecord, EmailMessage, RunReport, Summary,
    SummaryPeriod,
};

pub use agent::{CategorizerAgent, Delivery};
pub use categorizer::{CategorizationSettings, Categorizer, ModelVerdict};
pub use config::labels::{LabelDefinition, LabelSet};
pub use config::{CategorizationMode, Config, SummaryDelivery};
pub use gmail_client::{GmailClient, LabelInfo, ProductionGmailClient};
pub use llm::LanguageModel;
pub use state::AgentState;
