//! Blob-store seam for reply audio and relayed chunks
//!
//! The deployment's object store lives behind [`AudioStore`]; local setups
//! and tests use the filesystem implementation.

use anyhow::{Context, Result};
use base64::Engine;
use std::path::PathBuf;
use tracing::debug;

use crate::transport::DataReference;

/// Writes audio bytes and resolves references back into bytes. `put` returns
/// the reference a receiver later passes to `fetch`; inline references
/// resolve without touching the store.
#[async_trait::async_trait]
pub trait AudioStore: Send + Sync {
    async fn put(&self, key_hint: &str, bytes: &[u8]) -> Result<DataReference>;

    async fn fetch(&self, reference: &DataReference) -> Result<Vec<u8>>;
}

/// Filesystem-backed store
pub struct FsAudioStore {
    root: PathBuf,
}

impl FsAudioStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).context("Failed to create audio store directory")?;
        Ok(Self { root })
    }
}

#[async_trait::async_trait]
impl AudioStore for FsAudioStore {
    async fn put(&self, key_hint: &str, bytes: &[u8]) -> Result<DataReference> {
        let key = format!(
            "{}/{}-{}.bin",
            chrono::Utc::now().format("%Y/%m/%d"),
            key_hint,
            uuid::Uuid::new_v4()
        );
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create audio store subdirectory")?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write stored audio {}", key))?;

        debug!("Stored {} bytes at {}", bytes.len(), key);
        Ok(DataReference::Blob { reference: key })
    }

    async fn fetch(&self, reference: &DataReference) -> Result<Vec<u8>> {
        match reference {
            DataReference::Inline { data } => base64::engine::general_purpose::STANDARD
                .decode(data)
                .context("Invalid inline audio payload"),
            DataReference::Blob { reference } => tokio::fs::read(self.root.join(reference))
                .await
                .with_context(|| format!("Failed to read stored audio {}", reference)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_fetch_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAudioStore::new(dir.path()).unwrap();

        let bytes = vec![1u8, 2, 3, 4, 5];
        let reference = store.put("conv-1", &bytes).await.unwrap();
        assert!(matches!(reference, DataReference::Blob { .. }));

        let fetched = store.fetch(&reference).await.unwrap();
        assert_eq!(fetched, bytes);
    }

    #[tokio::test]
    async fn inline_references_decode_without_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAudioStore::new(dir.path()).unwrap();

        let reference = DataReference::Inline {
            data: base64::engine::general_purpose::STANDARD.encode([9u8, 8, 7]),
        };
        assert_eq!(store.fetch(&reference).await.unwrap(), vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn unknown_blob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAudioStore::new(dir.path()).unwrap();

        let reference = DataReference::Blob {
            reference: "missing".to_string(),
        };
        assert!(store.fetch(&reference).await.is_err());
    }
}
