use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{parse_watch_list, EndpointSource, SourceError};

/// Watch list stored as a plain-text file on disk.
#[derive(Debug, Clone)]
pub struct WatchListFile {
    path: PathBuf,
}

impl WatchListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the file (and missing parent directories) if it does not exist yet.
    ///
    /// Called at startup so an unusable location is reported before the first tick.
    pub async fn ensure_exists(&self) -> Result<(), SourceError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => self.create_empty().await,
            Err(source) => Err(SourceError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn create_empty(&self) -> Result<(), SourceError> {
        let create_err = |source| SourceError::Create {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(create_err)?;
        }
        tokio::fs::write(&self.path, b"").await.map_err(create_err)?;
        info!(path = %self.path.display(), "Created empty watch list");
        Ok(())
    }
}

#[async_trait]
impl EndpointSource for WatchListFile {
    async fn read(&self) -> Result<BTreeSet<String>, SourceError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.create_empty().await?;
                return Ok(BTreeSet::new());
            }
            Err(source) => {
                return Err(SourceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let urls = parse_watch_list(&content);
        debug!(path = %self.path.display(), count = urls.len(), "Read watch list");
        Ok(urls)
    }
}
