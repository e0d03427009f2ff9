//! Include/exclude filtering of messages by header patterns and labels

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{ExportError, Result};
use crate::models::{MessageFilter, MessageMetadata, MessageSummary};

static TRAILING_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());

pub const REASON_NO_INCLUDE_MATCH: &str = "No include patterns matched";
pub const REASON_SENDER: &str = "Skipped sender pattern";
pub const REASON_SUBJECT: &str = "Skipped subject pattern";
pub const REASON_RECIPIENT: &str = "Skipped recipient pattern";
pub const REASON_LABEL: &str = "Skipped label";

/// Keep/skip verdict for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDecision {
    pub skip: bool,
    pub reason: Option<String>,
}

impl FilterDecision {
    pub fn keep() -> Self {
        Self {
            skip: false,
            reason: None,
        }
    }

    pub fn skip(reason: &str) -> Self {
        Self {
            skip: true,
            reason: Some(reason.to_string()),
        }
    }
}

/// A [`MessageFilter`] with its patterns compiled
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    active: bool,
    labels: HashSet<String>,
    from: Vec<Regex>,
    to: Vec<Regex>,
    subject: Vec<Regex>,
}

impl CompiledFilter {
    pub fn compile(filter: &MessageFilter) -> Result<Self> {
        Ok(Self {
            active: filter.is_active(),
            labels: filter.labels.iter().map(|l| l.to_lowercase()).collect(),
            from: compile_patterns(&filter.from)?,
            to: compile_patterns(&filter.to)?,
            subject: compile_patterns(&filter.subject)?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn matches_from(&self, summary: &MessageSummary) -> bool {
        any_match(&self.from, Some(&summary.from))
    }

    fn matches_to(&self, summary: &MessageSummary) -> bool {
        any_match(&self.to, summary.to.as_deref())
    }

    fn matches_subject(&self, summary: &MessageSummary) -> bool {
        any_match(&self.subject, summary.subject.as_deref())
    }

    fn matches_label(&self, labels: &[String]) -> bool {
        labels
            .iter()
            .any(|label| self.labels.contains(&label.to_lowercase()))
    }

    fn matches_any(&self, summary: &MessageSummary, labels: &[String]) -> bool {
        self.matches_from(summary)
            || self.matches_to(summary)
            || self.matches_subject(summary)
            || self.matches_label(labels)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| ExportError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
        })
        .collect()
}

fn any_match(patterns: &[Regex], value: Option<&str>) -> bool {
    match value {
        Some(value) => patterns.iter().any(|re| re.is_match(value)),
        None => false,
    }
}

/// Include-then-exclude decision engine
///
/// An active include set is authoritative: a match keeps the message without
/// consulting the exclude set, and a miss skips it.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    include: CompiledFilter,
    exclude: CompiledFilter,
}

impl FilterEngine {
    pub fn new(include: &MessageFilter, exclude: &MessageFilter) -> Result<Self> {
        Ok(Self {
            include: CompiledFilter::compile(include)?,
            exclude: CompiledFilter::compile(exclude)?,
        })
    }

    /// `labels` holds the message's label ids and resolved label names
    pub fn evaluate(&self, summary: &MessageSummary, labels: &[String]) -> FilterDecision {
        if self.include.is_active() {
            return if self.include.matches_any(summary, labels) {
                FilterDecision::keep()
            } else {
                FilterDecision::skip(REASON_NO_INCLUDE_MATCH)
            };
        }

        if self.exclude.matches_from(summary) {
            FilterDecision::skip(REASON_SENDER)
        } else if self.exclude.matches_subject(summary) {
            FilterDecision::skip(REASON_SUBJECT)
        } else if self.exclude.matches_to(summary) {
            FilterDecision::skip(REASON_RECIPIENT)
        } else if self.exclude.matches_label(labels) {
            FilterDecision::skip(REASON_LABEL)
        } else {
            FilterDecision::keep()
        }
    }
}

/// Parse a `Date:` header, tolerating a trailing `(Zone)` comment
pub fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = TRAILING_COMMENT.replace(value.trim(), "");
    DateTime::parse_from_rfc2822(&cleaned)
        .or_else(|_| DateTime::parse_from_rfc3339(&cleaned))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Build the normalized header view of a message
///
/// `From` is required. The `Date` header wins when parseable, otherwise the
/// provider's internal date is used.
pub fn summarize(metadata: &MessageMetadata) -> Result<MessageSummary> {
    let from = metadata.header("From").ok_or_else(|| {
        ExportError::InvalidMessageFormat(format!("Message {} has no From header", metadata.id))
    })?;

    let header_date = metadata.header("Date").and_then(parse_date_header);
    if header_date.is_none() {
        debug!(message_id = %metadata.id, "Date header unusable, falling back to internal date");
    }
    let date = header_date.or(metadata.internal_date).ok_or_else(|| {
        ExportError::InvalidMessageFormat(format!("Message {} has no usable date", metadata.id))
    })?;

    let owned = |name: &str| metadata.header(name).map(str::to_string);

    Ok(MessageSummary {
        from: from.to_string(),
        to: owned("To"),
        subject: owned("Subject"),
        date,
        message_id: owned("Message-ID"),
        delivered_to: owned("Delivered-To"),
        reply_to: owned("Reply-To"),
        content_type: owned("Content-Type"),
        cc: owned("Cc"),
        bcc: owned("Bcc"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(from: &str, to: Option<&str>, subject: Option<&str>) -> MessageSummary {
        MessageSummary {
            from: from.to_string(),
            to: to.map(String::from),
            subject: subject.map(String::from),
            date: Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
            message_id: None,
            delivered_to: None,
            reply_to: None,
            content_type: None,
            cc: None,
            bcc: None,
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filters_keep_everything() {
        let engine = FilterEngine::new(&MessageFilter::default(), &MessageFilter::default()).unwrap();
        let decision = engine.evaluate(&summary("a@example.com", None, None), &labels(&["SPAM"]));
        assert_eq!(decision, FilterDecision::keep());
    }

    #[test]
    fn test_compiled_filter_activity_follows_model() {
        let empty = CompiledFilter::compile(&MessageFilter::default()).unwrap();
        assert!(!empty.is_active());

        let labels_only = MessageFilter {
            labels: ["Work".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(labels_only.is_active());
        assert!(CompiledFilter::compile(&labels_only).unwrap().is_active());
    }

    #[test]
    fn test_include_beats_exclude() {
        let include = MessageFilter {
            from: vec!["boss@".to_string()],
            ..Default::default()
        };
        let exclude = MessageFilter {
            from: vec!["boss@".to_string()],
            labels: ["SPAM".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let engine = FilterEngine::new(&include, &exclude).unwrap();

        let decision = engine.evaluate(
            &summary("Boss@Example.com", None, None),
            &labels(&["SPAM"]),
        );
        assert!(!decision.skip);
    }

    #[test]
    fn test_include_miss_skips_without_exclude() {
        let include = MessageFilter {
            subject: vec!["invoice".to_string()],
            ..Default::default()
        };
        let engine = FilterEngine::new(&include, &MessageFilter::default()).unwrap();

        let decision = engine.evaluate(&summary("a@example.com", None, Some("Lunch")), &[]);
        assert_eq!(decision, FilterDecision::skip(REASON_NO_INCLUDE_MATCH));
    }

    #[test]
    fn test_include_label_is_case_insensitive() {
        let include = MessageFilter {
            labels: ["inbox".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let engine = FilterEngine::new(&include, &MessageFilter::default()).unwrap();
        assert!(!engine.evaluate(&summary("a@x", None, None), &labels(&["INBOX"])).skip);
        assert!(engine.evaluate(&summary("a@x", None, None), &labels(&["SENT"])).skip);
    }

    #[test]
    fn test_exclude_reason_order() {
        let exclude = MessageFilter {
            from: vec!["noreply".to_string()],
            subject: vec!["newsletter".to_string()],
            to: vec!["list@".to_string()],
            labels: ["Promotions".to_string()].into_iter().collect(),
        };
        let engine = FilterEngine::new(&MessageFilter::default(), &exclude).unwrap();

        let all = summary("noreply@shop.com", Some("list@x.com"), Some("Weekly Newsletter"));
        assert_eq!(
            engine.evaluate(&all, &labels(&["promotions"])).reason.as_deref(),
            Some(REASON_SENDER)
        );

        let no_sender = summary("a@shop.com", Some("list@x.com"), Some("Weekly Newsletter"));
        assert_eq!(
            engine.evaluate(&no_sender, &[]).reason.as_deref(),
            Some(REASON_SUBJECT)
        );

        let only_to = summary("a@shop.com", Some("list@x.com"), Some("Hello"));
        assert_eq!(
            engine.evaluate(&only_to, &[]).reason.as_deref(),
            Some(REASON_RECIPIENT)
        );

        let only_label = summary("a@shop.com", None, None);
        assert_eq!(
            engine.evaluate(&only_label, &labels(&["PROMOTIONS"])).reason.as_deref(),
            Some(REASON_LABEL)
        );

        assert!(!engine.evaluate(&only_label, &[]).skip);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let include = MessageFilter {
            from: vec!["(unclosed".to_string()],
            ..Default::default()
        };
        let err = FilterEngine::new(&include, &MessageFilter::default()).unwrap_err();
        assert!(matches!(err, ExportError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_parse_date_header() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 12, 34, 56).unwrap();
        assert_eq!(parse_date_header("Tue, 2 Jan 2024 12:34:56 +0000"), Some(expected));
        assert_eq!(parse_date_header("Tue, 2 Jan 2024 13:34:56 +0100 (CET)"), Some(expected));
        assert_eq!(parse_date_header("2024-01-02T12:34:56Z"), Some(expected));
        assert_eq!(parse_date_header("yesterday"), None);
    }

    #[test]
    fn test_summarize_falls_back_to_internal_date() {
        let internal = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let metadata = MessageMetadata {
            id: "m1".to_string(),
            internal_date: Some(internal),
            headers: vec![
                ("from".to_string(), "a@example.com".to_string()),
                ("Date".to_string(), "not a date".to_string()),
                ("Subject".to_string(), "Hi".to_string()),
            ],
            ..Default::default()
        };

        let summary = summarize(&metadata).unwrap();
        assert_eq!(summary.date, internal);
        assert_eq!(summary.from, "a@example.com");
        assert_eq!(summary.subject.as_deref(), Some("Hi"));
        assert!(summary.to.is_none());
    }

    #[test]
    fn test_summarize_requires_from_and_date() {
        let no_from = MessageMetadata {
            id: "m1".to_string(),
            headers: vec![("Date".to_string(), "Tue, 2 Jan 2024 12:34:56 +0000".to_string())],
            ..Default::default()
        };
        assert!(matches!(summarize(&no_from), Err(ExportError::InvalidMessageFormat(_))));

        let no_date = MessageMetadata {
            id: "m2".to_string(),
            headers: vec![("From".to_string(), "a@example.com".to_string())],
            ..Default::default()
        };
        assert!(matches!(summarize(&no_date), Err(ExportError::InvalidMessageFormat(_))));
    }
}
