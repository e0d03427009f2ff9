use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Inclusive calendar date range of an export run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Build a range from calendar dates, each taken at UTC midnight
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end: end.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// Range ending on `end` and reaching `days` back
    pub fn trailing_days(end: NaiveDate, days: u32) -> Self {
        Self::from_dates(end - Duration::days(days as i64), end)
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// Include or exclude rule set
///
/// An empty rule set never matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: Vec<String>,
}

impl MessageFilter {
    /// True when at least one of the rule lists is non-empty
    pub fn is_active(&self) -> bool {
        !self.labels.is_empty()
            || !self.from.is_empty()
            || !self.to.is_empty()
            || !self.subject.is_empty()
    }
}

/// Lightweight reference returned by the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

/// One page of the listing endpoint
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

/// Header projection plus provider fields from a metadata-only fetch
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: Option<String>,
    pub label_ids: Vec<String>,
    pub internal_date: Option<DateTime<Utc>>,
    /// Header name/value pairs in provider order
    pub headers: Vec<(String, String)>,
}

impl MessageMetadata {
    /// First header value with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Normalized header view of one message used by filtering and naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub from: String,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub date: DateTime<Utc>,
    pub message_id: Option<String>,
    pub delivered_to: Option<String>,
    pub reply_to: Option<String>,
    pub content_type: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
}

/// Raw view of a message: full RFC 2822 bytes plus provider metadata
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    pub size_estimate: Option<i64>,
    pub history_id: Option<u64>,
    pub internal_date: Option<i64>,
    /// Decoded message bytes
    pub raw: Vec<u8>,
}

/// Where the bytes of a leaf part live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartContent {
    /// Decoded bytes carried inline in the part
    Inline(Vec<u8>),
    /// Reference to be fetched through the attachments endpoint
    Attachment(String),
    Empty,
}

/// Node of a message body tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartNode {
    Leaf {
        mime_type: String,
        filename: Option<String>,
        part_id: Option<String>,
        content: PartContent,
    },
    Composite {
        mime_type: String,
        children: Vec<PartNode>,
    },
}

/// Attachment payload as returned by the attachments endpoint
#[derive(Debug, Clone, Default)]
pub struct AttachmentBody {
    pub data: Option<Vec<u8>>,
    pub size: Option<i64>,
}

/// Label as listed for the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Output of walking one part tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub body: Option<String>,
    pub mime_type: Option<String>,
    pub attachments: Vec<PathBuf>,
}

/// Terminal state of one message within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Processed {
        id: String,
        path: PathBuf,
        attachments: Vec<PathBuf>,
    },
    SkippedExisting {
        id: String,
        path: PathBuf,
    },
    Filtered {
        id: String,
        reason: String,
    },
    Error {
        id: String,
        cause: String,
    },
}

/// Per-run tallies of message outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub errors: usize,
}

impl RunCounters {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Processed { .. } => self.processed += 1,
            MessageOutcome::SkippedExisting { .. } => self.skipped += 1,
            MessageOutcome::Filtered { .. } => self.filtered += 1,
            MessageOutcome::Error { .. } => self.errors += 1,
        }
    }

    /// Tally a batch of outcomes into a fresh counter set
    pub fn tally<'a>(outcomes: impl IntoIterator<Item = &'a MessageOutcome>) -> Self {
        let mut counters = Self::default();
        for outcome in outcomes {
            counters.record(outcome);
        }
        counters
    }

    pub fn merge(&mut self, other: RunCounters) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.filtered += other.filtered;
        self.errors += other.errors;
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.filtered + self.errors
    }
}
