//! File system helpers.
//!
//! Whole-file reads and atomic rewrites are the bread and butter of the
//! manifest patcher: every edit is a read-patch-write of a small text file,
//! and the write must never leave a half-patched file behind.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Ensure a directory exists, creating it and all parents if necessary.
///
/// # Errors
///
/// Fails when the path exists but is not a directory, or creation fails.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Read a whole text file.
///
/// # Errors
///
/// Fails when the file cannot be read, with the path in the error context.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Atomically write a string to a file using a write-then-rename strategy.
///
/// Content is written to a sibling `.tmp` file, synced, and renamed over the
/// target so readers never observe a partial write.
///
/// # Errors
///
/// Fails when the temporary file cannot be created, written, synced, or
/// renamed into place.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", temp_path.display()))?;
    }
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move {} into place", temp_path.display()))?;
    Ok(())
}

/// Replace `link` with a symlink pointing at `target`.
///
/// An existing symlink at `link` is removed first. A real directory at the
/// link path is an error rather than something to silently delete.
///
/// # Errors
///
/// Fails when the link path is occupied by a non-symlink, or link creation
/// fails.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(link)
                .with_context(|| format!("Failed to remove old link {}", link.display()))?;
        }
        Ok(_) => {
            anyhow::bail!(
                "Refusing to replace non-symlink path with a link: {}",
                link.display()
            );
        }
        Err(_) => {}
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("Failed to link {} -> {}", link.display(), target.display()))?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(target, link)
        .with_context(|| format!("Failed to link {} -> {}", link.display(), target.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op
        ensure_dir(&nested).unwrap();
    }

    #[test]
    fn test_atomic_write_and_read() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("out.txt");
        atomic_write(&file, "hello").unwrap();
        assert_eq!(read_text(&file).unwrap(), "hello");
        atomic_write(&file, "replaced").unwrap();
        assert_eq!(read_text(&file).unwrap(), "replaced");
        assert!(!dir.path().join("out.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_symlink() {
        let dir = TempDir::new().unwrap();
        let target_a = dir.path().join("a");
        let target_b = dir.path().join("b");
        ensure_dir(&target_a).unwrap();
        ensure_dir(&target_b).unwrap();

        let link = dir.path().join("current");
        replace_symlink(&target_a, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target_a);

        replace_symlink(&target_b, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target_b);
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_symlink_refuses_real_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        let occupied = dir.path().join("occupied");
        ensure_dir(&target).unwrap();
        ensure_dir(&occupied).unwrap();
        assert!(replace_symlink(&target, &occupied).is_err());
    }
}
