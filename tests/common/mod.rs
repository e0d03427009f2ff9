//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use gmail_export::client::MailClient;
use gmail_export::error::{ExportError, Result};
use gmail_export::exporter::ExportOptions;
use gmail_export::models::{
    AttachmentBody, DateRange, LabelInfo, MessageFilter, MessageMetadata, MessagePage,
    MessageRef, PartContent, PartNode, RawMessage,
};
use gmail_export::paths::{FilenameOption, OutputStructure, PathLayout};
use gmail_export::storage::{FsStorage, Storage};
use chrono::NaiveDate;
use mockall::mock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SAMPLE_DATE_HEADER: &str = "Tue, 2 Jan 2024 12:34:56 +0000";

mock! {
    pub Client {}

    #[async_trait]
    impl MailClient for Client {
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn list_messages_page(&self, query: &str, page_token: Option<String>) -> Result<MessagePage>;
        async fn get_message_metadata(&self, id: &str) -> Result<Option<MessageMetadata>>;
        async fn get_raw_message(&self, id: &str) -> Result<Option<RawMessage>>;
        async fn get_message_parts(&self, id: &str) -> Result<Option<PartNode>>;
        async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Option<AttachmentBody>>;
    }
}

/// In-memory mailbox with paged listing
#[derive(Default)]
pub struct FakeMailClient {
    pages: Vec<Vec<String>>,
    fail_on_page: Option<usize>,
    labels: Vec<LabelInfo>,
    metadata: HashMap<String, MessageMetadata>,
    raw: HashMap<String, RawMessage>,
    parts: HashMap<String, PartNode>,
    attachments: HashMap<(String, String), AttachmentBody>,
    list_calls: AtomicUsize,
    raw_calls: AtomicUsize,
    attachment_calls: AtomicUsize,
}

impl FakeMailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, ids: &[&str]) -> Self {
        self.pages.push(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    /// The listing call for page `index` (0-based) fails
    pub fn failing_on_page(mut self, index: usize) -> Self {
        self.fail_on_page = Some(index);
        self
    }

    pub fn with_label(mut self, id: &str, name: &str) -> Self {
        self.labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Register both the metadata and raw views of a message
    pub fn with_message(mut self, id: &str, from: &str, subject: &str) -> Self {
        self.metadata
            .insert(id.to_string(), create_metadata(id, from, subject));
        self.raw.insert(id.to_string(), create_raw(id, subject));
        self
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata.insert(metadata.id.clone(), metadata);
        self
    }

    pub fn with_parts(mut self, id: &str, root: PartNode) -> Self {
        self.parts.insert(id.to_string(), root);
        self
    }

    pub fn with_attachment(mut self, message_id: &str, attachment_id: &str, body: AttachmentBody) -> Self {
        self.attachments
            .insert((message_id.to_string(), attachment_id.to_string()), body);
        self
    }

    pub fn without_raw(mut self, id: &str) -> Self {
        self.raw.remove(id);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn raw_calls(&self) -> usize {
        self.raw_calls.load(Ordering::SeqCst)
    }

    pub fn attachment_calls(&self) -> usize {
        self.attachment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailClient for FakeMailClient {
    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.labels.clone())
    }

    async fn list_messages_page(
        &self,
        _query: &str,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ExportError::BadRequest(format!("bad token {}", token)))?,
        };

        if self.fail_on_page == Some(index) {
            return Err(ExportError::ServerError {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }

        let messages = self
            .pages
            .get(index)
            .map(|ids| {
                ids.iter()
                    .map(|id| MessageRef {
                        id: id.clone(),
                        thread_id: Some(format!("thread_{}", id)),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let next_page_token = if index + 1 < self.pages.len() {
            Some(format!("page-{}", index + 1))
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_page_token,
        })
    }

    async fn get_message_metadata(&self, id: &str) -> Result<Option<MessageMetadata>> {
        Ok(self.metadata.get(id).cloned())
    }

    async fn get_raw_message(&self, id: &str) -> Result<Option<RawMessage>> {
        self.raw_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.raw.get(id).cloned())
    }

    async fn get_message_parts(&self, id: &str) -> Result<Option<PartNode>> {
        Ok(self.parts.get(id).cloned())
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Option<AttachmentBody>> {
        self.attachment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned())
    }
}

/// [`FsStorage`] that records every write
#[derive(Default)]
pub struct CountingStorage {
    inner: FsStorage,
    writes: Mutex<Vec<PathBuf>>,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn written(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        self.inner.write_file(path, contents).await
    }
}

/// Metadata view with From, Subject and a fixed Date header
pub fn create_metadata(id: &str, from: &str, subject: &str) -> MessageMetadata {
    MessageMetadata {
        id: id.to_string(),
        thread_id: Some(format!("thread_{}", id)),
        label_ids: vec!["INBOX".to_string()],
        internal_date: None,
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("To".to_string(), "me@example.com".to_string()),
            ("Subject".to_string(), subject.to_string()),
            ("Date".to_string(), SAMPLE_DATE_HEADER.to_string()),
        ],
    }
}

pub fn create_raw(id: &str, subject: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        thread_id: Some(format!("thread_{}", id)),
        label_ids: vec!["INBOX".to_string()],
        snippet: Some(format!("Snippet of {}", subject)),
        size_estimate: Some(2048),
        history_id: Some(42),
        internal_date: Some(1_704_198_896_000),
        raw: format!("Subject: {}\r\nDate: {}\r\n\r\nBody of {}", subject, SAMPLE_DATE_HEADER, id)
            .into_bytes(),
    }
}

pub fn text_leaf(mime: &str, body: &str) -> PartNode {
    PartNode::Leaf {
        mime_type: mime.to_string(),
        filename: None,
        part_id: None,
        content: PartContent::Inline(body.as_bytes().to_vec()),
    }
}

pub fn attachment_leaf(mime: &str, filename: &str, part_id: &str, attachment_id: &str) -> PartNode {
    PartNode::Leaf {
        mime_type: mime.to_string(),
        filename: Some(filename.to_string()),
        part_id: Some(part_id.to_string()),
        content: PartContent::Attachment(attachment_id.to_string()),
    }
}

pub fn multipart(mime: &str, children: Vec<PartNode>) -> PartNode {
    PartNode::Composite {
        mime_type: mime.to_string(),
        children,
    }
}

/// January 2024, year structure, date/time/subject filenames, UTC
pub fn create_options(output_dir: &Path) -> ExportOptions {
    ExportOptions {
        layout: PathLayout {
            output_dir: output_dir.to_path_buf(),
            structure: OutputStructure::Year,
            filename: vec![
                FilenameOption::Date,
                FilenameOption::Time,
                FilenameOption::Subject,
            ],
            timezone: chrono_tz::UTC,
        },
        range: DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        ),
        include: MessageFilter::default(),
        exclude: MessageFilter::default(),
        dry_run: false,
        save_attachments: false,
        save_body: false,
    }
}

/// Every regular file below `dir`, sorted
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}
