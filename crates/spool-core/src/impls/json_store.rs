//! JSON file store: one pretty-printed document per queue file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::domain::{QueueDocument, QueueError};
use crate::ports::QueueStore;

/// Queue files resolved against `base_dir`.
///
/// Writes go to a sibling temp file and are renamed over the target, so a
/// reader never sees a half-written document. There is no locking: one
/// writer per queue file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute queue files are used as-is.
    pub fn path_for(&self, queue_file: &str) -> PathBuf {
        self.base_dir.join(queue_file)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "queue".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[async_trait]
impl QueueStore for JsonFileStore {
    async fn load(&self, queue_file: &str) -> Result<Option<QueueDocument>, QueueError> {
        let path = self.path_for(queue_file);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "queue file not found");
                return Ok(None);
            }
            Err(source) => return Err(QueueError::Read { path, source }),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let doc = serde_json::from_str(&content).map_err(|source| QueueError::Decode {
            path: path.clone(),
            source,
        })?;
        Ok(Some(doc))
    }

    async fn save(&self, queue_file: &str, doc: &QueueDocument) -> Result<(), QueueError> {
        let path = self.path_for(queue_file);
        let content = serde_json::to_string_pretty(doc).map_err(QueueError::Encode)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| QueueError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let tmp = temp_path(&path);
        fs::write(&tmp, content)
            .await
            .map_err(|source| QueueError::Write {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| QueueError::Write {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), items = doc.metadata.total_items, "saved queue document");
        Ok(())
    }
}
