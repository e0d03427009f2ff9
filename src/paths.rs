//! Destination path and filename conventions

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ExportError, Result};

const SUBJECT_SLUG_MAX_LEN: usize = 50;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// How deep exported files are nested below the output directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStructure {
    None,
    #[default]
    Year,
    Month,
    Day,
}

impl FromStr for OutputStructure {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            other => Err(ExportError::ConfigError(format!(
                "Invalid output structure '{}'. Must be 'none', 'year', 'month', or 'day'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
        };
        f.write_str(s)
    }
}

/// Optional filename components; the message id is always present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameOption {
    Date,
    Time,
    Subject,
}

/// Everything needed to place message files for a run
#[derive(Debug, Clone)]
pub struct PathLayout {
    pub output_dir: PathBuf,
    pub structure: OutputStructure,
    pub filename: Vec<FilenameOption>,
    pub timezone: Tz,
}

impl PathLayout {
    /// Reject layouts that repeat the day in both directory and filename
    pub fn validate(&self) -> Result<()> {
        if self.structure == OutputStructure::Day && self.filename.contains(&FilenameOption::Date)
        {
            return Err(ExportError::ConfigError(
                "The 'date' filename option cannot be combined with output structure 'day'"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// `<output_dir>[/<YYYY>[/<MM>[/<DD>]]]/<filename>.eml`
    pub fn message_path(&self, id: &str, date: DateTime<Utc>, subject: Option<&str>) -> PathBuf {
        let local = date.with_timezone(&self.timezone);

        let mut dir = self.output_dir.clone();
        if self.structure != OutputStructure::None {
            dir.push(local.format("%Y").to_string());
        }
        if matches!(self.structure, OutputStructure::Month | OutputStructure::Day) {
            dir.push(local.format("%m").to_string());
        }
        if self.structure == OutputStructure::Day {
            dir.push(local.format("%d").to_string());
        }

        let mut parts = Vec::new();
        if self.filename.contains(&FilenameOption::Date) {
            let date_format = match self.structure {
                OutputStructure::None => "%Y-%m-%d",
                OutputStructure::Year => "%m-%d",
                OutputStructure::Month | OutputStructure::Day => "%d",
            };
            parts.push(local.format(date_format).to_string());
        }
        if self.filename.contains(&FilenameOption::Time) {
            parts.push(local.format("%H%M").to_string());
        }
        parts.push(id.to_string());
        if self.filename.contains(&FilenameOption::Subject) {
            let slug = subject_slug(subject.unwrap_or_default());
            if !slug.is_empty() {
                parts.push(slug);
            }
        }

        dir.join(format!("{}.eml", parts.join("-")))
    }

    /// `<output_dir>/<YYYY>/<MM>/attachments/<DD>-<HHmm>-<subject>-<name><ext>`
    pub fn attachment_path(
        &self,
        date: DateTime<Utc>,
        subject: Option<&str>,
        filename: &str,
    ) -> PathBuf {
        attachment_path(&self.output_dir, date, &self.timezone, subject, filename)
    }
}

/// Lowercased subject with punctuation dropped and spaces hyphenated
pub fn subject_slug(subject: &str) -> String {
    let lowered = subject.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    let hyphenated = WHITESPACE_RUNS.replace_all(stripped.trim(), "-");
    let truncated: String = hyphenated.chars().take(SUBJECT_SLUG_MAX_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Replace characters that are unsafe in filenames with `-`
pub fn sanitize_path_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c => c,
        })
        .collect()
}

pub fn attachment_path(
    base: &Path,
    date: DateTime<Utc>,
    timezone: &Tz,
    subject: Option<&str>,
    filename: &str,
) -> PathBuf {
    let local = date.with_timezone(timezone);

    let (stem, ext) = match filename.rfind('.') {
        Some(i) if i > 0 => filename.split_at(i),
        _ => (filename, ""),
    };

    let file = format!(
        "{}-{}-{}{}",
        local.format("%d-%H%M"),
        sanitize_path_component(subject.unwrap_or_default()),
        sanitize_path_component(stem),
        sanitize_path_component(ext)
    );

    base.join(local.format("%Y").to_string())
        .join(local.format("%m").to_string())
        .join("attachments")
        .join(file)
}
