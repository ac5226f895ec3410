//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::labels::LabelSet;
use crate::config::Config;
use crate::models::{RunReport, SummaryPeriod};
use crate::state::AgentState;

#[derive(Parser, Debug)]
#[command(name = "gmail-categorizer")]
#[command(version)]
#[command(about = "Categorize Gmail messages into labels and send periodic summaries", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-categorizer/token.json")]
    pub token_cache: PathBuf,

    /// Path to agent state file
    #[arg(long, default_value = ".gmail-categorizer/state.json")]
    pub state_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if a token is cached
        #[arg(long)]
        force: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Create the category labels in Gmail
    SetupLabels,

    /// Categorize recent inbox mail once
    Run {
        /// Dry run mode (don't modify the mailbox)
        #[arg(long)]
        dry_run: bool,
    },

    /// Build a summary of recently categorized mail
    Summarize {
        /// Summary period: daily or weekly (defaults to the configured one)
        #[arg(long)]
        period: Option<SummaryPeriod>,

        /// Deliver through the configured channel instead of printing
        #[arg(long)]
        deliver: bool,
    },

    /// Keep categorizing on an interval until interrupted
    Watch {
        /// Dry run mode (don't modify the mailbox)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show agent state: last run, processed messages, history
    Status,

    /// List the configured category labels
    Labels,
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

/// Human-readable run report
pub fn format_run_report(report: &RunReport, labels: &LabelSet) -> String {
    let mut out = String::new();
    let title = if report.dry_run {
        "Categorization run (dry run)"
    } else {
        "Categorization run"
    };

    out.push_str(&format!("\n{}\n", title));
    out.push_str(&format!("{}\n", "=".repeat(title.len())));
    out.push_str(&format!("Run ID:            {}\n", report.run_id));
    out.push_str(&format!("Duration:          {}s\n", report.duration_seconds()));
    out.push_str(&format!("Messages found:    {}\n", report.scanned));
    out.push_str(&format!("Already processed: {}\n", report.already_processed));
    out.push_str(&format!("Categorized:       {}\n", report.categorized));

    if report.dry_run {
        out.push_str("No changes were made to the mailbox.\n");
    } else {
        out.push_str(&format!("Labeled:           {}\n", report.labeled));
        out.push_str(&format!("Archived:          {}\n", report.archived));
        if report.failed > 0 {
            out.push_str(&format!("Failed:            {}\n", report.failed));
        }
    }

    if !report.label_counts.is_empty() {
        out.push_str("\nBy label:\n");
        for (key, count) in &report.label_counts {
            let name = labels.get(key).map(|l| l.name.as_str()).unwrap_or(key);
            out.push_str(&format!("  {:<18} {:>5}\n", name, count));
        }
    }

    out
}

pub fn format_status(state: &AgentState, config: &Config) -> String {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    };

    let mut out = String::new();
    out.push_str("Agent status\n============\n");
    out.push_str(&format!(
        "State created:       {}\n",
        state.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Last run:            {}\n", fmt_time(state.last_run_at)));
    out.push_str(&format!("Last summary:        {}\n", fmt_time(state.last_summary_at)));
    out.push_str(&format!("Total categorized:   {}\n", state.total_categorized));
    out.push_str(&format!("Processed ids kept:  {}\n", state.processed_count()));
    out.push_str(&format!(
        "History records:     {} (kept {} days)\n",
        state.history.len(),
        config.agent.history_retention_days
    ));
    out.push_str(&format!(
        "Mode:                {:?}, summaries {} via {:?}\n",
        config.categorization.mode,
        if config.summary.enabled {
            config.summary.period.as_str()
        } else {
            "disabled"
        },
        config.summary.delivery
    ));
    out
}

pub fn format_label_table(labels: &LabelSet, prefix: &str) -> String {
    let mut out = format!("{} labels (Gmail prefix '{}')\n", labels.len(), prefix);
    for label in labels.iter() {
        out.push_str(&format!(
            "  {:<18} {:<24} {}\n",
            label.key,
            labels.gmail_name(prefix, &label.key).unwrap_or_default(),
            label.description
        ));
    }
    out
}

/// Resolve once `signal` fires
///
/// When the listener cannot be installed this never resolves, so `watch`
/// keeps polling instead of stopping after its first tick.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for Ctrl-C, stop the process another way: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_cli_parses_run_dry_run() {
        let cli = Cli::try_parse_from(["gmail-categorizer", "-v", "run", "--dry-run"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert!(matches!(cli.command, Commands::Run { dry_run: true }));
    }

    #[test]
    fn test_cli_parses_summarize_period() {
        let cli = Cli::try_parse_from([
            "gmail-categorizer",
            "--state-file",
            "/tmp/state.json",
            "summarize",
            "--period",
            "weekly",
            "--deliver",
        ])
        .unwrap();

        assert_eq!(cli.state_file, PathBuf::from("/tmp/state.json"));
        match cli.command {
            Commands::Summarize { period, deliver } => {
                assert_eq!(period, Some(SummaryPeriod::Weekly));
                assert!(deliver);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_period() {
        assert!(Cli::try_parse_from(["gmail-categorizer", "summarize", "--period", "hourly"]).is_err());
    }

    #[test]
    fn test_format_run_report() {
        let labels = LabelSet::defaults();
        let now = Utc::now();
        let report = RunReport {
            run_id: "run-1".to_string(),
            started_at: now,
            completed_at: now,
            scanned: 4,
            already_processed: 1,
            categorized: 3,
            labeled: 3,
            archived: 1,
            failed: 0,
            dry_run: false,
            label_counts: vec![("finance".to_string(), 2), ("promotions".to_string(), 1)],
        };

        let text = format_run_report(&report, &labels);
        assert!(text.contains("Messages found:    4"));
        assert!(text.contains("Archived:          1"));
        assert!(text.contains("Finance"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn test_format_status_and_labels() {
        let config = Config::default();
        let state = AgentState::new();

        let status = format_status(&state, &config);
        assert!(status.contains("Last run:            never"));
        assert!(status.contains("summaries daily"));

        let table = format_label_table(&LabelSet::defaults(), "AI");
        assert!(table.starts_with("11 labels"));
        assert!(table.contains("AI/Action Required"));
    }

    #[tokio::test]
    async fn test_shutdown_resolves_on_signal() {
        let stopped =
            tokio::time::timeout(Duration::from_secs(1), shutdown_on(async { Ok(()) })).await;
        assert!(stopped.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_never_resolves_without_a_signal_listener() {
        let broken = async {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "signal driver unavailable",
            ))
        };
        let stopped = tokio::time::timeout(Duration::from_secs(24 * 3600), shutdown_on(broken)).await;
        assert!(stopped.is_err());
    }
}
