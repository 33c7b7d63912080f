use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::ItemStore;
use crate::error::Result;
use crate::models::KnowledgeItem;

/// Working set kept as one JSON array in a file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ItemStore for JsonFileStore {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn load(&self) -> Result<Vec<KnowledgeItem>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Vec<KnowledgeItem>>(&raw) {
            Ok(items) => {
                log::debug!("Loaded {} items from {}", items.len(), self.path.display());
                Ok(items)
            }
            Err(e) => {
                log::warn!(
                    "Discarding unreadable saved items in {}: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, items: &[KnowledgeItem]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(items)?;

        // Readers see either the old file or the new one, never a partial write.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        log::debug!("Saved {} items to {}", items.len(), self.path.display());
        Ok(())
    }
}
