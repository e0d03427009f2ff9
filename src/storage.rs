//! Local filesystem accessor

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

use crate::error::Result;

/// Filesystem operations used by the exporter
#[async_trait]
pub trait Storage: Send + Sync {
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Recursive and idempotent
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Write the whole file, creating missing parent directories
    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// [`Storage`] backed by `tokio::fs`
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crashed run never leaves a truncated `.eml` that a re-run would skip.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        trace!(path = %path.display(), bytes = contents.len(), "Wrote file");
        Ok(())
    }
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn exists(&self, path: &Path) -> Result<bool> {
        self.as_ref().exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.as_ref().create_dir_all(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.as_ref().write_file(path, contents).await
    }
}
