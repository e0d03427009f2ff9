//! Production [`AttachmentSink`]: fetch, decode and write attachments

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::error::{ExportError, Result};
use crate::mime::{AttachmentEntry, AttachmentSink, AttachmentSource, MessageContext};
use crate::paths::PathLayout;
use crate::storage::Storage;

/// Saves attachments under `<output>/<YYYY>/<MM>/attachments/`
///
/// In dry-run mode remote data is still fetched, so a missing attachment
/// fails the same way it would in a real run; only the write is skipped.
pub struct AttachmentSaver<'a, C: MailClient + ?Sized, S: Storage + ?Sized> {
    client: &'a C,
    storage: &'a S,
    layout: &'a PathLayout,
    dry_run: bool,
}

impl<'a, C: MailClient + ?Sized, S: Storage + ?Sized> AttachmentSaver<'a, C, S> {
    pub fn new(client: &'a C, storage: &'a S, layout: &'a PathLayout, dry_run: bool) -> Self {
        Self {
            client,
            storage,
            layout,
            dry_run,
        }
    }

    async fn fetch(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let body = self
            .client
            .get_attachment(message_id, attachment_id)
            .await?
            .ok_or(ExportError::AttachmentMissing)?;

        body.data.ok_or(ExportError::AttachmentDataMissing)
    }
}

#[async_trait]
impl<'a, C: MailClient + ?Sized, S: Storage + ?Sized> AttachmentSink for AttachmentSaver<'a, C, S> {
    async fn save(&self, ctx: &MessageContext, entry: &AttachmentEntry) -> Result<PathBuf> {
        let path = self
            .layout
            .attachment_path(ctx.date, ctx.subject.as_deref(), &entry.filename);

        let data = match &entry.source {
            AttachmentSource::Remote(attachment_id) => self.fetch(&ctx.id, attachment_id).await?,
            AttachmentSource::Inline(bytes) => bytes.clone(),
        };

        if self.dry_run {
            info!(
                message_id = %ctx.id,
                path = %path.display(),
                bytes = data.len(),
                "[DRY RUN] Would save attachment"
            );
            return Ok(path);
        }

        self.storage.write_file(&path, &data).await?;
        debug!(
            message_id = %ctx.id,
            path = %path.display(),
            bytes = data.len(),
            "Saved attachment"
        );

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMailClient;
    use crate::models::AttachmentBody;
    use crate::paths::{FilenameOption, OutputStructure};
    use crate::storage::FsStorage;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> PathLayout {
        PathLayout {
            output_dir: dir.path().to_path_buf(),
            structure: OutputStructure::Year,
            filename: vec![FilenameOption::Date],
            timezone: chrono_tz::UTC,
        }
    }

    fn ctx() -> MessageContext {
        MessageContext {
            id: "m1".to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 2, 12, 34, 56).unwrap(),
            subject: Some("Invoice".to_string()),
        }
    }

    fn remote_entry() -> AttachmentEntry {
        AttachmentEntry {
            filename: "bill.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            part_id: Some("1".to_string()),
            source: AttachmentSource::Remote("att-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_saves_remote_attachment() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut client = MockMailClient::new();
        client
            .expect_get_attachment()
            .with(eq("m1"), eq("att-1"))
            .times(1)
            .returning(|_, _| {
                Ok(Some(AttachmentBody {
                    data: Some(b"%PDF".to_vec()),
                    size: Some(4),
                }))
            });

        let saver = AttachmentSaver::new(&client, &FsStorage, &layout, false);
        let path = saver.save(&ctx(), &remote_entry()).await.unwrap();

        assert_eq!(
            path,
            dir.path().join("2024/01/attachments/02-1234-Invoice-bill.pdf")
        );
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn test_inline_attachment_skips_fetch() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let client = MockMailClient::new();

        let entry = AttachmentEntry {
            source: AttachmentSource::Inline(b"a,b".to_vec()),
            filename: "data.csv".to_string(),
            ..remote_entry()
        };
        let saver = AttachmentSaver::new(&client, &FsStorage, &layout, false);
        let path = saver.save(&ctx(), &entry).await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"a,b");
    }

    #[tokio::test]
    async fn test_missing_attachment_errors() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);

        let mut client = MockMailClient::new();
        client.expect_get_attachment().returning(|_, _| Ok(None));
        let saver = AttachmentSaver::new(&client, &FsStorage, &layout, false);
        let err = saver.save(&ctx(), &remote_entry()).await.unwrap_err();
        assert_eq!(err.to_string(), "Attachment is null");

        let mut client = MockMailClient::new();
        client
            .expect_get_attachment()
            .returning(|_, _| Ok(Some(AttachmentBody::default())));
        let saver = AttachmentSaver::new(&client, &FsStorage, &layout, false);
        let err = saver.save(&ctx(), &remote_entry()).await.unwrap_err();
        assert_eq!(err.to_string(), "Attachment data is null");
    }

    #[tokio::test]
    async fn test_dry_run_fetches_but_does_not_write() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut client = MockMailClient::new();
        client
            .expect_get_attachment()
            .with(eq("m1"), eq("att-1"))
            .times(1)
            .returning(|_, _| {
                Ok(Some(AttachmentBody {
                    data: Some(b"%PDF".to_vec()),
                    size: Some(4),
                }))
            });

        let saver = AttachmentSaver::new(&client, &FsStorage, &layout, true);
        let path = saver.save(&ctx(), &remote_entry()).await.unwrap();

        assert!(path.ends_with("attachments/02-1234-Invoice-bill.pdf"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_reports_missing_attachment() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let mut client = MockMailClient::new();
        client.expect_get_attachment().times(1).returning(|_, _| Ok(None));

        let saver = AttachmentSaver::new(&client, &FsStorage, &layout, true);
        let err = saver.save(&ctx(), &remote_entry()).await.unwrap_err();

        assert!(matches!(err, ExportError::AttachmentMissing));
    }
}
