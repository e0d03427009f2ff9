//! Export orchestration: page loop, per-message state machine, run summary

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::attachments::AttachmentSaver;
use crate::client::MailClient;
use crate::error::{ExportError, Result};
use crate::filter::{summarize, FilterEngine};
use crate::headers::compose_artifact;
use crate::lister::MessageLister;
use crate::mime::{self, MessageContext, TEXT_HTML};
use crate::models::{DateRange, LabelInfo, MessageFilter, MessageOutcome, MessageRef, RunCounters};
use crate::paths::PathLayout;
use crate::query::build_query;
use crate::storage::Storage;

/// Called with the running totals after each page settles
pub type ProgressCallback = Arc<dyn Fn(&RunCounters) + Send + Sync>;

/// Everything that shapes one export run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub layout: PathLayout,
    pub range: DateRange,
    pub include: MessageFilter,
    pub exclude: MessageFilter,
    pub dry_run: bool,
    pub save_attachments: bool,
    pub save_body: bool,
}

impl ExportOptions {
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if !self.range.is_valid() {
            return Err(ExportError::ConfigError(format!(
                "Start date {} is after end date {}",
                self.range.start.date_naive(),
                self.range.end.date_naive()
            )));
        }
        Ok(())
    }

    fn needs_parts(&self) -> bool {
        self.save_attachments || self.save_body
    }

    fn filters_use_labels(&self) -> bool {
        !self.include.labels.is_empty() || !self.exclude.labels.is_empty()
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub found: usize,
    pub counters: RunCounters,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    /// Human-readable summary block
    pub fn render(&self) -> String {
        let banner = "=".repeat(50);
        let title = if self.dry_run {
            "Export Summary (DRY RUN)"
        } else {
            "Export Summary"
        };
        let duration = self.duration_seconds();

        let mut out = String::new();
        out.push_str(&format!("{}\n{}\n{}\n", banner, title, banner));
        out.push_str(&format!("Run ID:     {}\n", self.run_id));
        out.push_str(&format!("Found:      {}\n", self.found));
        out.push_str(&format!("Processed:  {}\n", self.counters.processed));
        out.push_str(&format!("Skipped:    {}\n", self.counters.skipped));
        out.push_str(&format!("Filtered:   {}\n", self.counters.filtered));
        out.push_str(&format!("Errors:     {}\n", self.counters.errors));
        out.push_str(&format!("Duration:   {}m {}s\n", duration / 60, duration % 60));
        out.push_str(&banner);
        out.push('\n');
        out
    }
}

/// Drives one export run over a mail client and a storage backend
pub struct Exporter<C: MailClient, S: Storage> {
    client: C,
    storage: S,
    options: ExportOptions,
    filter: FilterEngine,
    on_progress: Option<ProgressCallback>,
}

impl<C: MailClient, S: Storage> Exporter<C, S> {
    /// Validate the options and compile the filters.
    ///
    /// Fails with a configuration error before any remote call is made.
    pub fn new(client: C, storage: S, options: ExportOptions) -> Result<Self> {
        options.validate()?;
        let filter = FilterEngine::new(&options.include, &options.exclude)?;

        Ok(Self {
            client,
            storage,
            options,
            filter,
            on_progress: None,
        })
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Export every message matching the configured range and labels.
    ///
    /// Messages within a page are processed concurrently; the next page is
    /// requested only after the current one settled. A listing failure ends
    /// the run with [`ExportError::ListingAborted`] carrying the counters
    /// gathered so far.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, dry_run = self.options.dry_run, "Starting export run");

        let label_names = if self.options.filters_use_labels() {
            label_name_map(self.client.list_labels().await?)
        } else {
            HashMap::new()
        };

        let query = build_query(&self.options.range, &self.options.include, &self.options.exclude);
        let lister = MessageLister::new(&self.client);
        let mut pages = lister.pages(&query);
        let mut counters = RunCounters::default();

        while let Some(page) = pages.next().await {
            let refs = match page {
                Ok(refs) => refs,
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Message listing failed, aborting run");
                    return Err(ExportError::ListingAborted {
                        counters,
                        source: Box::new(e),
                    });
                }
            };

            let outcomes = join_all(
                refs.iter()
                    .map(|message| self.process_message(message, &label_names)),
            )
            .await;

            counters.merge(RunCounters::tally(&outcomes));
            debug!(
                page_messages = outcomes.len(),
                processed = counters.processed,
                skipped = counters.skipped,
                filtered = counters.filtered,
                errors = counters.errors,
                "Page settled"
            );
            if let Some(on_progress) = &self.on_progress {
                on_progress(&counters);
            }
        }

        let completed_at = Utc::now();
        info!(
            run_id = %run_id,
            processed = counters.processed,
            skipped = counters.skipped,
            filtered = counters.filtered,
            errors = counters.errors,
            "Export run complete"
        );

        Ok(RunSummary {
            run_id,
            found: counters.total(),
            counters,
            dry_run: self.options.dry_run,
            started_at,
            completed_at,
        })
    }

    /// Take one message to a terminal state; errors never escape
    pub async fn process_message(
        &self,
        message: &MessageRef,
        label_names: &HashMap<String, String>,
    ) -> MessageOutcome {
        match self.try_process(message, label_names).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to export message");
                MessageOutcome::Error {
                    id: message.id.clone(),
                    cause: e.to_string(),
                }
            }
        }
    }

    async fn try_process(
        &self,
        message: &MessageRef,
        label_names: &HashMap<String, String>,
    ) -> Result<MessageOutcome> {
        let id = message.id.as_str();

        let metadata = self
            .client
            .get_message_metadata(id)
            .await?
            .ok_or_else(|| ExportError::MissingMetadata(id.to_string()))?;
        let summary = summarize(&metadata)?;

        let labels = message_labels(&metadata.label_ids, label_names);
        let decision = self.filter.evaluate(&summary, &labels);
        if decision.skip {
            let reason = decision.reason.unwrap_or_default();
            info!(message_id = %id, reason = %reason, "Message filtered");
            return Ok(MessageOutcome::Filtered {
                id: id.to_string(),
                reason,
            });
        }

        let path = self
            .options
            .layout
            .message_path(id, summary.date, summary.subject.as_deref());
        if self.storage.exists(&path).await? {
            debug!(message_id = %id, path = %path.display(), "Already exported");
            return Ok(MessageOutcome::SkippedExisting {
                id: id.to_string(),
                path,
            });
        }

        let raw = self
            .client
            .get_raw_message(id)
            .await?
            .ok_or_else(|| ExportError::MissingRawContent(id.to_string()))?;
        let artifact = compose_artifact(&raw);

        let mut attachments = Vec::new();
        if self.options.needs_parts() {
            let root = self
                .client
                .get_message_parts(id)
                .await?
                .ok_or_else(|| ExportError::MissingRawContent(id.to_string()))?;
            let ctx = MessageContext {
                id: id.to_string(),
                date: summary.date,
                subject: summary.subject.clone(),
            };

            let body = if self.options.save_attachments {
                let saver = AttachmentSaver::new(
                    &self.client,
                    &self.storage,
                    &self.options.layout,
                    self.options.dry_run,
                );
                let extraction = mime::extract(&root, &ctx, &saver).await?;
                attachments = extraction.attachments;
                extraction.body.zip(extraction.mime_type)
            } else {
                mime::plan(&root, summary.date)
                    .body()
                    .map(|(body, mime_type)| (body.to_string(), mime_type.to_string()))
            };

            if self.options.save_body {
                if let Some((body, mime_type)) = body {
                    self.write_body(id, &path, &body, &mime_type).await?;
                }
            }
        }

        if self.options.dry_run {
            info!(message_id = %id, path = %path.display(), "[DRY RUN] Would export message");
        } else {
            self.storage.write_file(&path, &artifact).await?;
            debug!(message_id = %id, path = %path.display(), "Exported message");
        }

        Ok(MessageOutcome::Processed {
            id: id.to_string(),
            path,
            attachments,
        })
    }

    async fn write_body(
        &self,
        id: &str,
        message_path: &std::path::Path,
        body: &str,
        mime_type: &str,
    ) -> Result<PathBuf> {
        let extension = if mime_type == TEXT_HTML { "html" } else { "txt" };
        let body_path = message_path.with_extension(extension);

        if self.options.dry_run {
            info!(message_id = %id, path = %body_path.display(), "[DRY RUN] Would save body");
        } else {
            self.storage.write_file(&body_path, body.as_bytes()).await?;
        }
        Ok(body_path)
    }
}

/// Map label id to display name
pub fn label_name_map(labels: Vec<LabelInfo>) -> HashMap<String, String> {
    labels.into_iter().map(|l| (l.id, l.name)).collect()
}

/// Label ids of a message followed by the names they resolve to
fn message_labels(label_ids: &[String], names: &HashMap<String, String>) -> Vec<String> {
    let mut labels = label_ids.to_vec();
    labels.extend(label_ids.iter().filter_map(|id| names.get(id).cloned()));
    labels
}
