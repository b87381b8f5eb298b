pub mod delete;
pub mod get;
pub mod upload;

pub use delete::handle_delete;
pub use get::handle_get;
pub use upload::handle_upload;

use std::path::{Path, PathBuf};

/// The request target without its query string.
pub fn strip_query(target: &str) -> &str {
    target.split('?').next().unwrap_or(target)
}

/// True when any path segment is `..`.
pub fn has_dotdot(target: &str) -> bool {
    strip_query(target).split('/').any(|segment| segment == "..")
}

pub fn join_under_root(root: &Path, uri: &str) -> PathBuf {
    root.join(uri.trim_start_matches('/'))
}
