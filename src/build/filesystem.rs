//! Filesystem helpers shared by the release assembly stages.
//!
//! [`mirror_dir`] follows symlinks and materializes their content (mirrored
//! release directories); [`copy_dir_preserving_links`] reproduces links
//! verbatim (native library directory).

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

/// Remove a directory tree if it exists.
///
/// Returns `true` when something was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    if path.symlink_metadata().is_err() {
        return Ok(false);
    }
    if path.is_symlink() || path.is_file() {
        fs::remove_file(path).with_context(|| format!("removing '{}'", path.display()))?;
    } else {
        fs::remove_dir_all(path).with_context(|| format!("removing '{}'", path.display()))?;
    }
    Ok(true)
}

/// Copy a single file, keeping its permission bits and modification time.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .with_context(|| format!("copying '{}' -> '{}'", src.display(), dst.display()))?;

    let metadata = fs::metadata(src).with_context(|| format!("reading '{}'", src.display()))?;
    if let Ok(modified) = metadata.modified() {
        let handle = File::open(dst).with_context(|| format!("opening '{}'", dst.display()))?;
        handle
            .set_modified(modified)
            .with_context(|| format!("setting mtime on '{}'", dst.display()))?;
    }
    Ok(())
}

/// Recursively copy `src` to `dst`, dereferencing symlinks.
///
/// `dst` must not exist yet. Every symlink under `src` is replaced by a copy
/// of what it points to, so the resulting tree is self-contained. Files keep
/// their permission bits and modification time; directories get their
/// source mode once everything below them has been written, so read-only
/// source directories can still be mirrored.
///
/// # Arguments
///
/// * `src` - Directory to mirror (must exist)
/// * `dst` - Destination directory, created as needed
///
/// Returns the number of files copied.
///
/// # Example
///
/// ```rust,ignore
/// use fastr_release::build::filesystem::mirror_dir;
/// use std::path::Path;
///
/// let copied = mirror_dir(Path::new("fastr/library"), Path::new("release/library"))?;
/// ```
pub fn mirror_dir(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        bail!("release source directory not found: {}", src.display());
    }

    let mut copied = 0;
    let mut dir_modes = Vec::new();
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("walking '{}'", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            // Stays writable until its contents are in place
            fs::create_dir_all(&target)
                .with_context(|| format!("creating '{}'", target.display()))?;
            let mode = entry.metadata()?.permissions().mode();
            dir_modes.push((target, mode));
        } else {
            copy_file_with_metadata(entry.path(), &target)?;
            copied += 1;
        }
    }

    // Walk order lists parents first, so apply modes deepest first
    for (dir, mode) in dir_modes.iter().rev() {
        fs::set_permissions(dir, fs::Permissions::from_mode(*mode))
            .with_context(|| format!("setting permissions on '{}'", dir.display()))?;
    }

    Ok(copied)
}

/// Recursively copy a directory, preserving symlinks as links.
///
/// Symlinks are recreated with their literal target (see [`copy_symlink`]),
/// directories are recursed into and regular files are copied with their
/// metadata. Existing entries under `dst` are overwritten.
///
/// # Arguments
///
/// * `src` - Source directory
/// * `dst` - Destination directory (created if missing)
pub fn copy_dir_preserving_links(src: &Path, dst: &Path) -> Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)
            .with_context(|| format!("Failed to create directory: {}", dst.display()))?;
    }

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            // Keep the alias, not the content it points to
            copy_symlink(&src_path, &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_preserving_links(&src_path, &dst_path)?;
        } else {
            copy_file_with_metadata(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

/// Recreate the symlink at `src` as `dst` with the same (unresolved) target.
pub fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target =
        fs::read_link(src).with_context(|| format!("reading link '{}'", src.display()))?;
    if dst.symlink_metadata().is_ok() {
        fs::remove_file(dst).with_context(|| format!("removing '{}'", dst.display()))?;
    }
    std::os::unix::fs::symlink(&target, dst).with_context(|| {
        format!(
            "linking '{}' -> '{}'",
            dst.display(),
            target.to_string_lossy()
        )
    })?;
    Ok(())
}

/// Replace `path` with `contents` through a sibling temporary file.
///
/// The permission bits of the existing file are carried over, so rewriting
/// an executable script keeps it executable.
pub fn replace_file_contents(path: &Path, contents: &[u8]) -> Result<()> {
    let mode = fs::metadata(path)
        .with_context(|| format!("reading metadata '{}'", path.display()))?
        .permissions()
        .mode();

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("'{}' has no file name", path.display()))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, contents).with_context(|| format!("writing '{}'", tmp.display()))?;
    fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on '{}'", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming '{}' -> '{}'", tmp.display(), path.display()))?;
    Ok(())
}
