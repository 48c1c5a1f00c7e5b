//! Key/path translation and temp-file discipline
//!
//! Downloads never write directly to their final path. Bytes land in a
//! sibling temp file named `<basename>.s3tmp.<8-hex>[.ext]` which is
//! atomically renamed into place on success and unlinked on any failure, so
//! a crashed or failed transfer leaves no partial artifact under the final
//! name.

use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::fs;

use crate::error::{TransferError, TransferResult};

const TEMP_MARKER: &str = ".s3tmp.";
const TEMP_SUFFIX_LEN: usize = 8;

/// Map an object key to a path relative to the destination root
///
/// Returns `None` for keys that must be skipped: folder placeholders (keys
/// ending in the delimiter), keys that strip down to nothing, and keys whose
/// relative path would escape the destination.
pub(crate) fn key_to_relative_path(
    key: &str,
    prefix: Option<&str>,
    delimiter: &str,
) -> Option<PathBuf> {
    let mut remaining = key;
    if let Some(prefix) = prefix {
        if let Some(stripped) = remaining.strip_prefix(prefix) {
            remaining = stripped;
        }
    }
    let remaining = remaining.strip_prefix(delimiter).unwrap_or(remaining);

    if remaining.is_empty() || remaining.ends_with(delimiter) {
        return None;
    }

    let components: Vec<&str> = remaining
        .split(delimiter)
        .filter(|c| !c.is_empty())
        .collect();
    if components.is_empty() || escapes_destination(&components) {
        return None;
    }

    let mut path = PathBuf::new();
    for component in components {
        path.push(component);
    }
    Some(path)
}

/// Conservative traversal guard: interpret components left to right with a
/// running depth counter (`..` is -1, everything else +1). A key whose depth
/// ever goes negative is rejected, even if it would re-enter the destination
/// later.
fn escapes_destination(components: &[&str]) -> bool {
    let mut depth: i64 = 0;
    for component in components {
        if *component == ".." {
            depth -= 1;
        } else {
            depth += 1;
        }
        if depth < 0 {
            return true;
        }
    }
    false
}

/// Map a path relative to the source root to an object key
pub(crate) fn path_to_key(
    relative: &Path,
    prefix: Option<&str>,
    delimiter: &str,
) -> TransferResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let name = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| TransferError::InvalidFileName(relative.display().to_string()))?;
        if name.contains(delimiter) {
            return Err(TransferError::InvalidFileName(format!(
                "path component {:?} contains the delimiter {:?}",
                name, delimiter
            )));
        }
        parts.push(name);
    }

    let key = parts.join(delimiter);
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            if prefix.ends_with(delimiter) {
                Ok(format!("{}{}", prefix, key))
            } else {
                Ok(format!("{}{}{}", prefix, delimiter, key))
            }
        }
        _ => Ok(key),
    }
}

/// Build a temp sibling name for `file_name` with the given 8-hex suffix
fn construct_temp_name(file_name: &str, suffix: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => {
            format!("{base}{TEMP_MARKER}{suffix}.{ext}")
        }
        _ => format!("{file_name}{TEMP_MARKER}{suffix}"),
    }
}

/// Recover the final file name from a temp name, if it matches the
/// `<basename>.s3tmp.<8-hex>[.ext]` grammar. Useful for recognizing and
/// cleaning up temp files left behind by a crashed process.
pub fn deconstruct_temp_name(temp_name: &str) -> Option<String> {
    let (base, rest) = temp_name.split_once(TEMP_MARKER)?;
    if base.is_empty() || rest.len() < TEMP_SUFFIX_LEN {
        return None;
    }
    let (suffix, tail) = rest.split_at(TEMP_SUFFIX_LEN);
    if !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match tail {
        "" => Some(base.to_string()),
        ext if ext.starts_with('.') => Some(format!("{base}{ext}")),
        _ => None,
    }
}

/// A temp file paired with its final destination
#[derive(Debug)]
pub(crate) struct TempFile {
    final_path: PathBuf,
    temp_path: PathBuf,
}

impl TempFile {
    /// Create an empty temp sibling of `final_path`, regenerating the
    /// random suffix until the name is unused.
    pub(crate) async fn create(final_path: PathBuf) -> TransferResult<TempFile> {
        let dir = final_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidFileName(final_path.display().to_string()))?
            .to_string();

        loop {
            let suffix = format!("{:08x}", rand::thread_rng().gen::<u32>());
            let temp_path = dir.join(construct_temp_name(&file_name, &suffix));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)
                .await
            {
                Ok(_) => {
                    return Ok(TempFile {
                        final_path,
                        temp_path,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Path all writes go to
    pub(crate) fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Final destination path
    pub(crate) fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Atomically move the temp file into place, overwriting any existing
    /// file. On failure the temp file is removed and the operation fails.
    pub(crate) async fn finalize(self) -> TransferResult<PathBuf> {
        match fs::rename(&self.temp_path, &self.final_path).await {
            Ok(()) => Ok(self.final_path),
            Err(_) => {
                let _ = fs::remove_file(&self.temp_path).await;
                Err(TransferError::FailedToRenameTemporaryFileAfterDownload(
                    self.final_path,
                ))
            }
        }
    }

    /// Unlink the temp file, best effort
    pub(crate) async fn remove(self) {
        let _ = fs::remove_file(&self.temp_path).await;
    }
}
