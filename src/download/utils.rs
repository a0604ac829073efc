use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const EXTENSION: &str = "mp4";
const PART_SUFFIX: &str = ".part";

/// Final location of a download named `title` inside `target_dir`.
pub fn build_download_path(title: &str, target_dir: &Path) -> PathBuf {
    let name = sanitize_filename::sanitize(title.trim());
    let name = if name.is_empty() { "download".to_string() } else { name };
    target_dir.join(format!("{name}.{EXTENSION}"))
}

/// Temporary file a download is written to before being moved into place.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PART_SUFFIX);
    path.with_file_name(name)
}

/// Deletes the `.part` file of `path`, if any. Returns whether one existed.
pub fn remove_partial(path: &Path) -> bool {
    let part = part_path(path);
    if !part.exists() {
        return false;
    }
    match fs::remove_file(&part) {
        Ok(()) => {
            debug!(path = %part.display(), "removed partial file");
            true
        }
        Err(e) => {
            warn!(path = %part.display(), error = %e, "failed to remove partial file");
            false
        }
    }
}
