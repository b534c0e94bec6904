use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write content to a file
///
/// This function writes to a temporary file in the same directory,
/// syncs to disk, then renames to the target path. Readers see either the
/// old content or the new content, never a partial file. The temporary
/// file is created exclusively under a random name with `mode` already
/// applied, and is removed if any step fails.
pub fn atomic_write(path: &Path, content: &[u8], mode: Option<u32>) -> Result<()> {
    // Create parent directory if it doesn't exist
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_directory_exists(dir)?;

    let mut temp = create_temp_file(dir, path, mode)?;

    temp.write_all(content)
        .context("Failed to write to temporary file")?;
    temp.as_file()
        .sync_all()
        .context("Failed to sync file to disk")?;

    // Rename to target path (atomic operation). On failure the returned
    // temp file is dropped, which deletes it.
    temp.persist(path).map_err(|e| e.error).with_context(|| {
        format!("Failed to rename temporary file to {}", path.display())
    })?;

    Ok(())
}

/// Hidden sibling of `path` opened with `O_EXCL`, mode 0600 until `mode` is set
///
/// The mode is applied through the open handle before any byte is written.
fn create_temp_file(dir: &Path, path: &Path, mode: Option<u32>) -> Result<NamedTempFile> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = mode {
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(mode))
                .with_context(|| {
                    format!("Failed to set permissions for: {}", temp.path().display())
                })?;
        }
    }

    #[cfg(not(unix))]
    let _ = mode;

    Ok(temp)
}

/// Ensure a directory exists, creating it and all parents if needed
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    Ok(())
}
