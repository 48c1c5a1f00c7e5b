//! Lazy asynchronous directory traversal
//!
//! Breadth-first walk over a source root, yielding regular files as they
//! are discovered. Symlinks are resolved to canonical paths for cycle and
//! duplicate suppression, but yielded relative paths preserve the observed
//! symlink names so uploaded keys match what the user sees on disk.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::fs;
use tokio::sync::mpsc;

use crate::error::{TransferError, TransferResult};

/// One file discovered under the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path used to open the file
    pub path: PathBuf,
    /// Path relative to the source root, with observed (symlink) names
    pub relative: PathBuf,
}

/// Streaming producer of the files to upload
///
/// Traversal runs in a background task feeding a bounded channel, so
/// discovery keeps pace with consumption instead of materializing the whole
/// tree up front. A traversal error terminates the stream.
#[derive(Debug)]
pub struct DirectoryTraverser {
    receiver: mpsc::Receiver<TransferResult<FileEntry>>,
}

impl DirectoryTraverser {
    /// Start traversing `root`
    pub fn start(root: PathBuf, recursive: bool, follow_symlinks: bool) -> Self {
        let (tx, receiver) = mpsc::channel(64);
        tokio::spawn(walk(root, recursive, follow_symlinks, tx));
        Self { receiver }
    }

    /// Next discovered file, or `None` when traversal is finished
    pub async fn next(&mut self) -> Option<TransferResult<FileEntry>> {
        self.receiver.recv().await
    }
}

impl Stream for DirectoryTraverser {
    type Item = TransferResult<FileEntry>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

async fn walk(
    root: PathBuf,
    recursive: bool,
    follow_symlinks: bool,
    tx: mpsc::Sender<TransferResult<FileEntry>>,
) {
    if let Err(error) = walk_inner(root, recursive, follow_symlinks, &tx).await {
        let _ = tx.send(Err(error)).await;
    }
}

async fn walk_inner(
    root: PathBuf,
    recursive: bool,
    follow_symlinks: bool,
    tx: &mpsc::Sender<TransferResult<FileEntry>>,
) -> TransferResult<()> {
    let root_meta = fs::metadata(&root)
        .await
        .map_err(|e| TransferError::InvalidSourceUrl(format!("{}: {}", root.display(), e)))?;
    if !root_meta.is_dir() {
        return Err(TransferError::InvalidSourceUrl(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut visited: HashSet<PathBuf> = HashSet::new();
    if let Ok(canonical) = fs::canonicalize(&root).await {
        visited.insert(canonical);
    }

    let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
    queue.push_back((root, PathBuf::new()));

    while let Some((dir, relative)) = queue.pop_front() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let name = entry.file_name();
            let path = entry.path();
            let child_relative = relative.join(&name);

            if file_type.is_symlink() {
                if !follow_symlinks {
                    continue;
                }
                // Resolve the target to detect cycles and duplicates, but
                // keep the symlink's own name in the relative path.
                let resolved = fs::canonicalize(&path).await?;
                if !visited.insert(resolved) {
                    continue;
                }
                let target_meta = fs::metadata(&path).await?;
                if target_meta.is_file() {
                    if tx
                        .send(Ok(FileEntry {
                            path,
                            relative: child_relative,
                        }))
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                } else if target_meta.is_dir() && recursive {
                    queue.push_back((path, child_relative));
                }
            } else if file_type.is_dir() {
                if let Ok(resolved) = fs::canonicalize(&path).await {
                    if !visited.insert(resolved) {
                        continue;
                    }
                }
                if recursive {
                    queue.push_back((path, child_relative));
                }
            } else if file_type.is_file() {
                if let Ok(resolved) = fs::canonicalize(&path).await {
                    if !visited.insert(resolved) {
                        continue;
                    }
                }
                if tx
                    .send(Ok(FileEntry {
                        path,
                        relative: child_relative,
                    }))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
            // Other file types (sockets, devices) are skipped.
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    async fn collect(mut traverser: DirectoryTraverser) -> TransferResult<BTreeSet<PathBuf>> {
        let mut seen = BTreeSet::new();
        while let Some(item) = traverser.next().await {
            seen.insert(item?.relative);
        }
        Ok(seen)
    }

    #[tokio::test]
    async fn test_recursive_walk_yields_all_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("a/mid.txt"), b"2").unwrap();
        std::fs::write(dir.path().join("a/b/leaf.txt"), b"3").unwrap();

        let traverser = DirectoryTraverser::start(dir.path().to_path_buf(), true, false);
        let seen = collect(traverser).await.unwrap();

        let expected: BTreeSet<PathBuf> = [
            PathBuf::from("top.txt"),
            PathBuf::from("a").join("mid.txt"),
            PathBuf::from("a").join("b").join("leaf.txt"),
        ]
        .into_iter()
        .collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_non_recursive_walk_stays_shallow() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("sub/deep.txt"), b"2").unwrap();

        let traverser = DirectoryTraverser::start(dir.path().to_path_buf(), false, false);
        let seen = collect(traverser).await.unwrap();

        assert_eq!(seen, [PathBuf::from("top.txt")].into_iter().collect());
    }

    #[tokio::test]
    async fn test_missing_root_is_terminal_error() {
        let traverser =
            DirectoryTraverser::start(PathBuf::from("/definitely/not/here"), true, false);
        let result = collect(traverser).await;
        assert!(matches!(result, Err(TransferError::InvalidSourceUrl(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"1").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let traverser = DirectoryTraverser::start(dir.path().to_path_buf(), true, false);
        let seen = collect(traverser).await.unwrap();
        assert_eq!(seen, [PathBuf::from("real.txt")].into_iter().collect());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_followed_symlink_yields_distinct_file_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"1").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let traverser = DirectoryTraverser::start(dir.path().to_path_buf(), true, true);
        let seen = collect(traverser).await.unwrap();

        // The real file and its alias resolve to one canonical path, so
        // exactly one of them yields.
        assert_eq!(seen.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("inner")).unwrap();
        std::fs::write(dir.path().join("inner/file.txt"), b"1").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("inner/loop")).unwrap();

        let traverser = DirectoryTraverser::start(dir.path().to_path_buf(), true, true);
        let seen = collect(traverser).await.unwrap();
        assert_eq!(
            seen,
            [PathBuf::from("inner").join("file.txt")].into_iter().collect()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_name_preserved_in_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("target_dir")).unwrap();
        std::fs::write(dir.path().join("target_dir/file.txt"), b"1").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target_dir"), dir.path().join("linked"))
            .unwrap();

        let traverser = DirectoryTraverser::start(dir.path().to_path_buf(), true, true);
        let seen = collect(traverser).await.unwrap();

        // One of the two names wins the visited-set race deterministically
        // by discovery order, and the relative path uses the name it was
        // reached through.
        assert_eq!(seen.len(), 1);
        let only = seen.into_iter().next().unwrap();
        assert!(
            only == PathBuf::from("target_dir").join("file.txt")
                || only == PathBuf::from("linked").join("file.txt"),
            "unexpected path {only:?}"
        );
    }
}
