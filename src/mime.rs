//! Body and attachment extraction from a message part tree
//!
//! [`plan`] is a pure fold over the tree; [`extract`] runs it and hands every
//! attachment to an [`AttachmentSink`], which owns all fetching and writing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

use crate::error::Result;
use crate::models::{ExtractionResult, PartContent, PartNode};

pub const TEXT_HTML: &str = "text/html";
pub const TEXT_PLAIN: &str = "text/plain";

/// Where an attachment's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Fetched separately by attachment id
    Remote(String),
    /// Already present in the part
    Inline(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentEntry {
    pub filename: String,
    pub mime_type: String,
    pub part_id: Option<String>,
    pub source: AttachmentSource,
}

/// Result of folding a part tree, before any I/O
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartPlan {
    pub html: Option<String>,
    pub plain: Option<String>,
    pub attachments: Vec<AttachmentEntry>,
}

impl PartPlan {
    /// Selected body and its MIME type; HTML is preferred over plain text
    pub fn body(&self) -> Option<(&str, &'static str)> {
        self.html
            .as_deref()
            .map(|b| (b, TEXT_HTML))
            .or_else(|| self.plain.as_deref().map(|b| (b, TEXT_PLAIN)))
    }
}

/// Body candidate tagged with the depth of the leaf it came from
type Candidate = Option<(usize, String)>;

#[derive(Default)]
struct Fold {
    html: Candidate,
    plain: Candidate,
    attachments: Vec<AttachmentEntry>,
}

impl Fold {
    fn merge(&mut self, other: Fold) {
        keep_deeper(&mut self.html, other.html);
        keep_deeper(&mut self.plain, other.plain);
        self.attachments.extend(other.attachments);
    }

    fn into_plan(self) -> PartPlan {
        PartPlan {
            html: self.html.map(|(_, body)| body),
            plain: self.plain.map(|(_, body)| body),
            attachments: self.attachments,
        }
    }
}

// Deeper wins; at equal depth the later sibling wins
fn keep_deeper(current: &mut Candidate, incoming: Candidate) {
    if let Some((depth, body)) = incoming {
        if current.as_ref().map_or(true, |(d, _)| depth >= *d) {
            *current = Some((depth, body));
        }
    }
}

/// Message-level facts the sink needs to place attachments
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub id: String,
    pub date: DateTime<Utc>,
    pub subject: Option<String>,
}

/// Capability that persists one attachment and reports where it went
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    async fn save(&self, ctx: &MessageContext, entry: &AttachmentEntry) -> Result<PathBuf>;
}

/// Fold the part tree into body candidates and attachment entries.
///
/// A deeper candidate of the same type replaces a shallower one; between
/// siblings the later one wins. Attachments keep document order.
pub fn plan(node: &PartNode, message_date: DateTime<Utc>) -> PartPlan {
    fold(node, message_date, 0).into_plan()
}

fn fold(node: &PartNode, message_date: DateTime<Utc>, depth: usize) -> Fold {
    match node {
        PartNode::Composite { children, .. } => {
            let mut acc = Fold::default();
            for child in children {
                acc.merge(fold(child, message_date, depth + 1));
            }
            acc
        }
        PartNode::Leaf {
            mime_type,
            filename,
            part_id,
            content,
        } => {
            let filename = filename.as_deref().filter(|f| !f.is_empty());
            let mut leaf = Fold::default();

            match (content, filename) {
                (PartContent::Inline(data), None) if mime_type == TEXT_HTML => {
                    leaf.html = Some((depth, String::from_utf8_lossy(data).into_owned()));
                }
                (PartContent::Inline(data), None) if mime_type == TEXT_PLAIN => {
                    leaf.plain = Some((depth, String::from_utf8_lossy(data).into_owned()));
                }
                (PartContent::Inline(data), Some(name)) => {
                    leaf.attachments.push(AttachmentEntry {
                        filename: name.to_string(),
                        mime_type: mime_type.clone(),
                        part_id: part_id.clone(),
                        source: AttachmentSource::Inline(data.clone()),
                    });
                }
                (PartContent::Attachment(id), name) => {
                    let filename = match name {
                        Some(name) => name.to_string(),
                        None => synthesize_filename(message_date, part_id.as_deref(), mime_type),
                    };
                    leaf.attachments.push(AttachmentEntry {
                        filename,
                        mime_type: mime_type.clone(),
                        part_id: part_id.clone(),
                        source: AttachmentSource::Remote(id.clone()),
                    });
                }
                _ => {}
            }

            leaf
        }
    }
}

/// `<message-date-millis>[-<part-id>]<ext>`
pub fn synthesize_filename(
    message_date: DateTime<Utc>,
    part_id: Option<&str>,
    mime_type: &str,
) -> String {
    let mut name = message_date.timestamp_millis().to_string();
    if let Some(part_id) = part_id.filter(|p| !p.is_empty()) {
        name.push('-');
        name.push_str(part_id);
    }
    name.push_str(&extension_for(mime_type));
    name
}

/// File extension (with the leading dot) for a MIME type
pub fn extension_for(mime_type: &str) -> String {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let known = match essence.as_str() {
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "text/csv" => Some("csv"),
        "text/calendar" => Some("ics"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        "application/json" => Some("json"),
        "message/rfc822" => Some("eml"),
        "application/octet-stream" => Some("bin"),
        _ => None,
    };

    let ext = known
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&essence)
                .and_then(|exts| exts.first().copied())
        })
        .unwrap_or("bin");

    format!(".{}", ext)
}

/// Plan the tree, then save every attachment through `sink` in order.
///
/// The first sink error aborts the walk.
pub async fn extract<S: AttachmentSink + ?Sized>(
    root: &PartNode,
    ctx: &MessageContext,
    sink: &S,
) -> Result<ExtractionResult> {
    let plan = plan(root, ctx.date);
    debug!(
        message_id = %ctx.id,
        attachments = plan.attachments.len(),
        has_html = plan.html.is_some(),
        has_plain = plan.plain.is_some(),
        "Planned part tree"
    );

    let mut attachments = Vec::with_capacity(plan.attachments.len());
    for entry in &plan.attachments {
        attachments.push(sink.save(ctx, entry).await?);
    }

    let (body, mime_type) = match plan.body() {
        Some((body, mime)) => (Some(body.to_string()), Some(mime.to_string())),
        None => (None, None),
    };

    Ok(ExtractionResult {
        body,
        mime_type,
        attachments,
    })
}
