//! Local filesystem support for directory transfers

mod layout;
mod traverse;

pub use layout::deconstruct_temp_name;
pub(crate) use layout::{key_to_relative_path, path_to_key, TempFile};
pub use traverse::{DirectoryTraverser, FileEntry};

/// Default delimiter separating key components in the object store
pub const DEFAULT_DELIMITER: &str = "/";
