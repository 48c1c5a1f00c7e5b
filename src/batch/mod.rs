//! Directory-scale transfer orchestration
//!
//! Both directory operations share the same shape: a discovery stream feeds
//! a bounded window of per-object child transfers, per-child outcomes are
//! tallied, and per-child failures go through the configured
//! [`FailurePolicy`].

mod download_bucket;
mod upload_dir;

pub use download_bucket::{DownloadBucketInput, DownloadBucketResult};
pub use upload_dir::{UploadDirectoryInput, UploadDirectoryResult};

pub(crate) use download_bucket::download_bucket;
pub(crate) use upload_dir::upload_directory;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::progress::{DirectoryListener, DirectoryProgressSnapshot};

/// What to do when one object inside a directory operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail fast: surface the error, cancelling all sibling transfers
    #[default]
    Rethrow,
    /// Tally the failure and continue with the remaining objects
    Ignore,
}

/// Shared success/failure tally for one directory operation
pub(crate) struct DirectoryTally {
    counts: Mutex<(u64, u64)>,
    listeners: Vec<Arc<dyn DirectoryListener>>,
}

impl DirectoryTally {
    pub(crate) fn new(listeners: Vec<Arc<dyn DirectoryListener>>) -> Arc<Self> {
        Arc::new(Self {
            counts: Mutex::new((0, 0)),
            listeners,
        })
    }

    pub(crate) fn record_success(&self) {
        let snapshot = {
            let mut counts = self.counts.lock().unwrap();
            counts.0 += 1;
            snapshot_of(*counts)
        };
        self.notify(snapshot);
    }

    pub(crate) fn record_failure(&self) {
        let snapshot = {
            let mut counts = self.counts.lock().unwrap();
            counts.1 += 1;
            snapshot_of(*counts)
        };
        self.notify(snapshot);
    }

    pub(crate) fn succeeded(&self) -> u64 {
        self.counts.lock().unwrap().0
    }

    pub(crate) fn failed(&self) -> u64 {
        self.counts.lock().unwrap().1
    }

    fn notify(&self, snapshot: DirectoryProgressSnapshot) {
        for listener in &self.listeners {
            listener.on_progress(snapshot);
        }
    }
}

fn snapshot_of((succeeded, failed): (u64, u64)) -> DirectoryProgressSnapshot {
    DirectoryProgressSnapshot {
        transferred_files: succeeded,
        total_files: succeeded + failed,
    }
}
