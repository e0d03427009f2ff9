//! Command-line interface

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth;
use crate::client::{MailClient, ProductionGmailClient};
use crate::config::Config;
use crate::error::Result;
use crate::exporter::{Exporter, ProgressCallback, RunSummary};
use crate::models::{LabelInfo, RunCounters};
use crate::paths::OutputStructure;
use crate::storage::FsStorage;

#[derive(Parser, Debug)]
#[command(name = "gmail-export")]
#[command(version = "0.1.0")]
#[command(about = "Export Gmail messages in a date range to local .eml files", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-export/token.json")]
    pub token_cache: PathBuf,

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
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Export messages to .eml files
    Export(ExportArgs),

    /// List the labels of the account
    Labels,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags of the `export` command; each one overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// First day to export (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day to export, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Directory the .eml files are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Directory nesting: none, year, month or day
    #[arg(long)]
    pub structure: Option<OutputStructure>,

    /// IANA timezone used for paths and filenames
    #[arg(long)]
    pub timezone: Option<String>,

    /// Dry run mode (don't write any files)
    #[arg(long)]
    pub dry_run: bool,

    /// Also save attachments next to the messages
    #[arg(long)]
    pub save_attachments: bool,
}

impl ExportArgs {
    /// Overlay the flags onto a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(start) = self.start {
            config.export.start = Some(start);
        }
        if let Some(end) = self.end {
            config.export.end = Some(end);
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
        if let Some(structure) = self.structure {
            config.export.output_structure = structure;
        }
        if let Some(timezone) = &self.timezone {
            config.export.timezone = timezone.clone();
        }
        if self.dry_run {
            config.export.dry_run = true;
        }
        if self.save_attachments {
            config.export.save_attachments = true;
        }
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so lines print above spinners
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
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
        Self::new()
    }
}

/// Spinner text for the running totals
pub fn progress_message(counters: &RunCounters) -> String {
    format!(
        "Exporting messages... {} processed, {} skipped, {} filtered, {} errors",
        counters.processed, counters.skipped, counters.filtered, counters.errors
    )
}

async fn connect(cli: &Cli, config: &Config) -> Result<ProductionGmailClient> {
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    Ok(ProductionGmailClient::new(
        hub,
        &config.api.user_id,
        config.api.page_size,
        config.api.max_concurrent_requests,
    ))
}

/// Run the `export` command end to end
///
/// Configuration (file plus flag overrides) is validated before any remote
/// call is made.
pub async fn run_export(cli: &Cli, args: &ExportArgs, multi: MultiProgress) -> Result<RunSummary> {
    let reporter = ProgressReporter::with_multi_progress(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    args.apply(&mut config);
    config.validate()?;
    let options = config.export_options(Utc::now().date_naive())?;
    reporter.finish_spinner(
        &config_spinner,
        &format!(
            "Exporting {} to {} into {:?}",
            options.range.start.date_naive(),
            options.range.end.date_naive(),
            options.layout.output_dir
        ),
    );

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let client = connect(cli, &config).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated successfully");

    let export_spinner = reporter.add_spinner("Exporting messages...");
    let spinner = export_spinner.clone();
    let on_progress: ProgressCallback = Arc::new(move |counters: &RunCounters| {
        spinner.set_message(progress_message(counters));
    });

    let exporter = Exporter::new(client, FsStorage, options)?.with_progress(on_progress);
    match exporter.run().await {
        Ok(summary) => {
            reporter.finish_spinner(
                &export_spinner,
                &format!("Exported {} messages", summary.counters.processed),
            );
            Ok(summary)
        }
        Err(e) => {
            export_spinner.finish_and_clear();
            Err(e)
        }
    }
}

/// Fetch the account's labels, sorted by name
pub async fn list_labels(cli: &Cli) -> Result<Vec<LabelInfo>> {
    let config = Config::load(&cli.config).await?;
    config.validate()?;
    let client = connect(cli, &config).await?;

    let mut labels = client.list_labels().await?;
    labels.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(labels)
}
