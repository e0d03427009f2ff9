//! Gmail API accessor used by the export pipeline

use async_trait::async_trait;
use chrono::DateTime;
use google_gmail1::api::{Message, MessagePart};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::auth::{GmailHub, READONLY_SCOPES};
use crate::error::{ExportError, Result};
use crate::models::{
    AttachmentBody, LabelInfo, MessageMetadata, MessagePage, MessageRef, PartContent, PartNode,
    RawMessage,
};

/// Headers requested by metadata-only fetches
pub const METADATA_HEADERS: &[&str] = &[
    "From",
    "To",
    "Subject",
    "Date",
    "Message-ID",
    "Delivered-To",
    "Reply-To",
    "Content-Type",
    "Cc",
    "Bcc",
];

/// Remote mail operations the exporter depends on.
///
/// Lookups of a single resource return `Ok(None)` when the provider has
/// nothing for the given id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Fetch one page of message references matching `query`
    async fn list_messages_page(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Metadata-only view restricted to [`METADATA_HEADERS`]
    async fn get_message_metadata(&self, id: &str) -> Result<Option<MessageMetadata>>;

    /// Full RFC 2822 content plus provider metadata
    async fn get_raw_message(&self, id: &str) -> Result<Option<RawMessage>>;

    /// Structured body tree of the message
    async fn get_message_parts(&self, id: &str) -> Result<Option<PartNode>>;

    /// Attachment payload referenced from a body part
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Option<AttachmentBody>>;
}

/// Production Gmail client
///
/// Concurrent API calls are capped with a semaphore; nothing is retried.
pub struct ProductionGmailClient {
    hub: GmailHub,
    user_id: String,
    page_size: u32,
    rate_limiter: Arc<Semaphore>,
}

impl ProductionGmailClient {
    /// Create a new production Gmail client
    ///
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `user_id` - Mailbox owner, usually `"me"`
    /// * `page_size` - Messages requested per listing page
    /// * `max_concurrent` - Maximum concurrent requests (typically 40-50)
    pub fn new(hub: GmailHub, user_id: &str, page_size: u32, max_concurrent: usize) -> Self {
        Self {
            hub,
            user_id: user_id.to_string(),
            page_size,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    async fn acquire_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.rate_limiter
            .acquire()
            .await
            .map_err(|e| ExportError::ApiError(format!("Failed to acquire permit: {}", e)))
    }

    async fn get_message_in_format(&self, id: &str, format: &str) -> Result<Option<Message>> {
        let _permit = self.acquire_permit().await?;

        let mut call = self
            .hub
            .users()
            .messages_get(&self.user_id, id)
            .format(format);

        if format == "metadata" {
            for header in METADATA_HEADERS {
                call = call.add_metadata_headers(header);
            }
        }

        match call.add_scope(READONLY_SCOPES[0]).doit().await {
            Ok((_, message)) => Ok(Some(message)),
            Err(e) => not_found_as_none(e.into()),
        }
    }
}

/// Collapse a 404 into `Ok(None)` and keep every other error
fn not_found_as_none<T>(error: ExportError) -> Result<Option<T>> {
    if error.is_not_found() {
        Ok(None)
    } else {
        Err(error)
    }
}

/// Convert a metadata-format message into our header projection
pub fn message_to_metadata(message: Message) -> Result<MessageMetadata> {
    let id = message
        .id
        .ok_or_else(|| ExportError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers = message
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|h| match (h.name, h.value) {
            (Some(name), Some(value)) => Some((name, value)),
            _ => None,
        })
        .collect();

    Ok(MessageMetadata {
        id,
        thread_id: message.thread_id,
        label_ids: message.label_ids.unwrap_or_default(),
        internal_date: message.internal_date.and_then(DateTime::from_timestamp_millis),
        headers,
    })
}

/// Convert a raw-format message; `None` when the payload is absent
pub fn message_to_raw(message: Message) -> Result<Option<RawMessage>> {
    let id = message
        .id
        .ok_or_else(|| ExportError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let Some(raw) = message.raw else {
        return Ok(None);
    };

    Ok(Some(RawMessage {
        id,
        thread_id: message.thread_id,
        label_ids: message.label_ids.unwrap_or_default(),
        snippet: message.snippet,
        size_estimate: message.size_estimate.map(i64::from),
        history_id: message.history_id,
        internal_date: message.internal_date,
        raw,
    }))
}

/// Convert the provider's loosely-typed part into a [`PartNode`]
pub fn part_to_node(part: MessagePart) -> PartNode {
    let mime_type = part
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".to_string())
        .to_ascii_lowercase();

    let children = part.parts.unwrap_or_default();
    if !children.is_empty() {
        return PartNode::Composite {
            mime_type,
            children: children.into_iter().map(part_to_node).collect(),
        };
    }

    let body = part.body.unwrap_or_default();
    let content = match (body.data, body.attachment_id) {
        (Some(data), _) if !data.is_empty() => PartContent::Inline(data),
        (_, Some(attachment_id)) if !attachment_id.is_empty() => {
            PartContent::Attachment(attachment_id)
        }
        _ => PartContent::Empty,
    };

    PartNode::Leaf {
        mime_type,
        filename: part.filename.filter(|f| !f.is_empty()),
        part_id: part.part_id.filter(|p| !p.is_empty()),
        content,
    }
}

#[async_trait]
impl MailClient for ProductionGmailClient {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let _permit = self.acquire_permit().await?;

        debug!("Calling Gmail API to list labels...");
        let (_, response) = self
            .hub
            .users()
            .labels_list(&self.user_id)
            .add_scope(READONLY_SCOPES[0])
            .doit()
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
    }

    async fn list_messages_page(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let _permit = self.acquire_permit().await?;

        let mut call = self
            .hub
            .users()
            .messages_list(&self.user_id)
            .q(query)
            .max_results(self.page_size);

        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = call.add_scope(READONLY_SCOPES[0]).doit().await?;

        let messages = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| {
                msg.id.map(|id| MessageRef {
                    id,
                    thread_id: msg.thread_id,
                })
            })
            .collect();

        Ok(MessagePage {
            messages,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_message_metadata(&self, id: &str) -> Result<Option<MessageMetadata>> {
        match self.get_message_in_format(id, "metadata").await? {
            Some(message) => message_to_metadata(message).map(Some),
            None => Ok(None),
        }
    }

    async fn get_raw_message(&self, id: &str) -> Result<Option<RawMessage>> {
        match self.get_message_in_format(id, "raw").await? {
            Some(message) => message_to_raw(message),
            None => Ok(None),
        }
    }

    async fn get_message_parts(&self, id: &str) -> Result<Option<PartNode>> {
        Ok(self
            .get_message_in_format(id, "full")
            .await?
            .and_then(|message| message.payload)
            .map(part_to_node))
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Option<AttachmentBody>> {
        let _permit = self.acquire_permit().await?;

        let result = self
            .hub
            .users()
            .messages_attachments_get(&self.user_id, message_id, attachment_id)
            .add_scope(READONLY_SCOPES[0])
            .doit()
            .await;

        match result {
            Ok((_, body)) => Ok(Some(AttachmentBody {
                data: body.data,
                size: body.size.map(i64::from),
            })),
            Err(e) => not_found_as_none(e.into()),
        }
    }
}

// Shared ownership for callers that hand the client to several components
#[async_trait]
impl<T: MailClient + ?Sized> MailClient for Arc<T> {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn list_messages_page(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        self.as_ref().list_messages_page(query, page_token).await
    }

    async fn get_message_metadata(&self, id: &str) -> Result<Option<MessageMetadata>> {
        self.as_ref().get_message_metadata(id).await
    }

    async fn get_raw_message(&self, id: &str) -> Result<Option<RawMessage>> {
        self.as_ref().get_raw_message(id).await
    }

    async fn get_message_parts(&self, id: &str) -> Result<Option<PartNode>> {
        self.as_ref().get_message_parts(id).await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Option<AttachmentBody>> {
        self.as_ref().get_attachment(message_id, attachment_id).await
    }
}
