mod file;

pub use file::WatchListFile;

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to create watch list {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read watch list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies the set of URLs to monitor.
///
/// Called once at the start of every tick, so implementations must not cache
/// across calls: edits made between ticks have to show up on the next read.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn read(&self) -> Result<BTreeSet<String>, SourceError>;
}

/// Parse watch-list text: one URL per line, `#` comments and blank lines skipped.
///
/// Entries are not validated here. A malformed URL is tracked like any other and
/// resolves to a failed check.
pub fn parse_watch_list(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
