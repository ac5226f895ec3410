use anyhow::{Context, Result};
use clap::Parser;
use gmail_categorizer_agent::agent::{CategorizerAgent, Delivery};
use gmail_categorizer_agent::auth;
use gmail_categorizer_agent::cli::{
    format_label_table, format_run_report, format_status, shutdown_on, Cli, Commands,
    ProgressReporter,
};
use gmail_categorizer_agent::config::templates::render_summary_text;
use gmail_categorizer_agent::config::Config;
use gmail_categorizer_agent::gmail_client::ProductionGmailClient;
use gmail_categorizer_agent::llm::build_model;
use gmail_categorizer_agent::state::AgentState;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: gmail-categorizer --help");
        process::exit(1);
    }
}

async fn load_config(cli: &Cli, dry_run: bool) -> Result<Config> {
    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;
    config.apply_env_overrides()?;
    if dry_run {
        config.execution.dry_run = true;
    }
    Ok(config)
}

async fn connect(cli: &Cli, config: &Config) -> Result<ProductionGmailClient> {
    let hub = auth::authenticate(&cli.credentials, &cli.token_cache, false)
        .await
        .context("Gmail authentication failed; run `gmail-categorizer auth` first")?;
    Ok(ProductionGmailClient::new(
        hub,
        config.gmail.max_concurrent_requests,
    ))
}

async fn build_agent(
    cli: &Cli,
    config: Config,
) -> Result<CategorizerAgent<ProductionGmailClient>> {
    let client = connect(cli, &config).await?;
    let model = build_model(&config.llm);
    Ok(CategorizerAgent::new(client, config, model, cli.state_file.clone()).await?)
}

async fn run() -> Result<()> {
    // Install default crypto provider for rustls; aws-lc-rs off Windows, ring on it
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_categorizer_agent=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_categorizer_agent=info,warn"))
    };

    // Logs print above spinners through the shared MultiProgress
    let multi_progress = Arc::new(MultiProgress::new());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: Arc::clone(&multi_progress),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let progress = ProgressReporter::new(multi_progress.as_ref().clone());

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            auth::authenticate(&cli.credentials, &cli.token_cache, *force).await?;
            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "{:?} already exists; pass --force to overwrite it",
                    output
                );
            }
            Config::create_example(output).await?;
            println!("Created example configuration at {:?}", output);
        }

        Commands::SetupLabels => {
            let config = load_config(&cli, false).await?;
            let prefix = config.labels.prefix.clone();
            let mut agent = build_agent(&cli, config).await?;

            let spinner = progress.add_spinner("Creating labels...");
            let label_ids = agent.ensure_labels().await?;
            progress.finish_spinner(
                &spinner,
                &format!("{} labels ready under '{}'", label_ids.len(), prefix),
            );
        }

        Commands::Run { dry_run } => {
            let config = load_config(&cli, *dry_run).await?;
            if config.execution.dry_run {
                println!("Running in DRY RUN mode - no changes will be made");
            }
            let mut agent = build_agent(&cli, config).await?;

            let spinner = progress.add_spinner("Categorizing recent inbox mail...");
            let report = agent.run_once().await?;
            progress.finish_spinner(
                &spinner,
                &format!("Categorized {} messages", report.categorized),
            );
            println!("{}", format_run_report(&report, agent.labels()));
        }

        Commands::Summarize { period, deliver } => {
            let config = load_config(&cli, false).await?;
            let period = period.unwrap_or(config.summary.period);
            let mut agent = build_agent(&cli, config).await?;

            let summary = agent.summarize(period).await?;
            if *deliver {
                match agent.deliver_summary(&summary).await? {
                    Delivery::Printed => {}
                    Delivery::Written(path) => println!("Summary written to {:?}", path),
                    Delivery::Emailed { recipient, .. } => {
                        println!("Summary emailed to {}", recipient)
                    }
                    Delivery::Skipped => println!("Dry run: summary not written or sent"),
                }
            } else {
                println!("{}", render_summary_text(&summary, agent.labels())?);
            }
        }

        Commands::Watch { dry_run } => {
            let config = load_config(&cli, *dry_run).await?;
            let mut agent = build_agent(&cli, config).await?;

            println!("Watching inbox, press Ctrl-C to stop");
            agent
                .watch(shutdown_on(tokio::signal::ctrl_c()))
                .await?;
        }

        Commands::Status => {
            let config = load_config(&cli, false).await?;
            let state = AgentState::load(&cli.state_file).await?;
            println!("{}", format_status(&state, &config));
        }

        Commands::Labels => {
            let config = load_config(&cli, false).await?;
            let labels = config.label_set()?;
            println!("{}", format_label_table(&labels, &config.labels.prefix));
        }
    }

    Ok(())
}
