use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

/// Replaces a JSON state snapshot through a sibling temp file and a rename,
/// so readers see either the old snapshot or the new one.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("state snapshot path cannot be empty");
    }
    if path.is_dir() {
        bail!("state snapshot path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir).with_context(|| {
        format!(
            "failed to create state snapshot directory {}",
            parent_dir.display()
        )
    })?;

    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("state"),
        std::process::id(),
        current_unix_timestamp_ms()
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to stage state snapshot {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to publish state snapshot {} as {}",
            temp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
