use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Upper bound for an audit snapshot.
pub(crate) const SNAPSHOT_CAP_BYTES: usize = 512 * 1024;

/// Write the first [`SNAPSHOT_CAP_BYTES`] of `body` to `dir/name`, creating `dir` if needed.
///
/// Truncation happens on a character boundary so the file stays valid UTF-8.
pub(crate) fn write_snapshot(dir: &Path, name: &str, body: &str) -> Result<PathBuf, std::io::Error> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    let path = dir.join(name);
    let capped = truncate_on_boundary(body, SNAPSHOT_CAP_BYTES);

    let mut file = fs::File::create(&path)?;
    file.write_all(capped.as_bytes())?;

    debug!(path = %path.display(), bytes = capped.len(), "snapshot written");
    Ok(path)
}

fn truncate_on_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
