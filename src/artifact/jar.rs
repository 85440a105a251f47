//! Zip-format jar bundles.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use zip::write::FileOptions;
use zip::CompressionMethod;

use super::participant::ArchiveParticipant;
use super::tarball::ArchiveEntry;

/// Write `entries` into a jar at `out_path`, consulting `participant`.
///
/// Directories are skipped; symlinks are stored as their target's content.
/// `closing` runs after the archive is finalized. Returns the number of
/// entries written.
pub fn write_jar(
    entries: &[ArchiveEntry],
    out_path: &Path,
    participant: &mut dyn ArchiveParticipant,
) -> Result<usize> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating '{}'", parent.display()))?;
    }
    let file =
        File::create(out_path).with_context(|| format!("creating '{}'", out_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    participant.opened(out_path)?;

    let mut written = 0;
    for entry in entries {
        let metadata = fs::metadata(&entry.path)
            .with_context(|| format!("reading '{}'", entry.path.display()))?;
        if metadata.is_dir() {
            continue;
        }

        let data =
            fs::read(&entry.path).with_context(|| format!("reading '{}'", entry.path.display()))?;
        if participant.add(&entry.arcname, &data)? {
            continue;
        }

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(metadata.permissions().mode());
        zip.start_file(entry.arcname.as_str(), options)
            .with_context(|| format!("adding '{}' to '{}'", entry.arcname, out_path.display()))?;
        zip.write_all(&data)?;
        written += 1;
    }

    zip.finish()
        .with_context(|| format!("finishing '{}'", out_path.display()))?;
    // Hooks only see a complete archive
    participant.closing()?;
    Ok(written)
}
