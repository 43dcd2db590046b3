use async_trait::async_trait;
use std::path::PathBuf;
use tracing::instrument;

use super::CatalogSource;
use crate::sync::error::SyncError;
use crate::sync::item::{CatalogItem, CatalogPayload};

/// Offline catalogue import from a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch_items(&self) -> Result<Vec<CatalogItem>, SyncError> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            SyncError::Transport(format!("read catalogue file {}: {e}", self.path.display()))
        })?;
        CatalogPayload::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::ErrorKind;
    use std::io::Write;

    #[tokio::test]
    async fn reads_bare_array() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"[{{"sku":"A","name":"Mug","price_minor":500}},{{"sku":"B","name":"Plate","price_minor":800,"stock":4}}]"#
        )
        .unwrap();

        let items = FileCatalogSource::new(f.path()).fetch_items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].stock, Some(4));
    }

    #[tokio::test]
    async fn missing_file_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileCatalogSource::new(dir.path().join("nope.json"))
            .fetch_items()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("nope.json"));
    }
}
