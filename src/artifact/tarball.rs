//! Deterministic tar writing and filtered extraction.
//!
//! Headers are normalized (mtime 0, uid/gid 0) so identical inputs give
//! byte-identical archives; modes are kept and symlinks stay links.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

/// A filesystem path and the name it gets inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub arcname: String,
}

/// Every path under `root` (excluding `root` itself), sorted by archive name.
///
/// Symlinks are listed as themselves and never followed, so a link to a
/// directory shows up once and its target's contents do not.
///
/// # Arguments
///
/// * `root` - Directory to list; archive names are relative to it
///
/// # Example
///
/// ```rust,ignore
/// use fastr_release::artifact::tarball::{directory_entries, write_tar};
///
/// let entries = directory_entries(Path::new("mxbuild/layouts/support"))?;
/// write_tar(&entries, Path::new("fastr-support.tar"))?;
/// ```
pub fn directory_entries(root: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for ent in WalkDir::new(root).follow_links(false).min_depth(1) {
        let ent = ent.with_context(|| format!("walking '{}'", root.display()))?;
        entries.push(ArchiveEntry {
            arcname: arcname_for(root, ent.path())?,
            path: ent.path().to_path_buf(),
        });
    }
    entries.sort_by(|a, b| a.arcname.cmp(&b.arcname));
    Ok(entries)
}

/// Archive name of `path` relative to `root`, always `/`-separated.
pub fn arcname_for(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("'{}' is not under '{}'", path.display(), root.display()))?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

/// Write `entries` to a tar archive at `out_path` in the given order.
///
/// Parent directories of `out_path` are created as needed and an existing
/// archive is overwritten. Entries are not sorted here; callers hand them
/// in the order they should appear.
///
/// # Arguments
///
/// * `entries` - Files, directories and symlinks with their archive names
/// * `out_path` - Archive to create
///
/// # Example
///
/// ```rust,ignore
/// use fastr_release::artifact::tarball::{write_tar, ArchiveEntry};
///
/// let entries = vec![ArchiveEntry {
///     path: PathBuf::from("com.oracle.truffle.r.release/LICENSE"),
///     arcname: "LICENSE".to_string(),
/// }];
/// write_tar(&entries, Path::new("fastr.tar"))?;
/// ```
pub fn write_tar(entries: &[ArchiveEntry], out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating '{}'", parent.display()))?;
    }
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let mut builder = TarBuilder::new(BufWriter::new(out));

    for entry in entries {
        append_entry(&mut builder, &entry.path, &entry.arcname)
            .with_context(|| format!("adding '{}' to archive", entry.path.display()))?;
    }

    let mut writer = builder
        .into_inner()
        .with_context(|| "Failed to finalize tar builder")?;
    writer.flush()?;
    Ok(())
}

fn append_entry<W: Write>(builder: &mut TarBuilder<W>, path: &Path, rel: &str) -> Result<()> {
    let md = fs::symlink_metadata(path)?;
    // Same bytes for the same tree, whoever built it
    let mut header = tar::Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(md.permissions().mode());

    if md.is_dir() {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_cksum();
        builder.append_data(&mut header, rel, io::empty())?;
    } else if md.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_link_name(&target)?;
        header.set_cksum();
        builder.append_data(&mut header, rel, io::empty())?;
    } else if md.is_file() {
        let mut f = File::open(path)?;
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(md.len());
        header.set_cksum();
        builder.append_data(&mut header, rel, &mut f)?;
    }
    Ok(())
}

/// Unpack the entries of `archive` accepted by `select` into `dest`.
///
/// `select` gets the entry's archive name (without a leading `./`) and
/// returns the path to unpack it to, relative to `dest`, or `None` to skip.
/// Returns the number of entries unpacked.
///
/// A file or link already at the target path is replaced; directories are
/// merged.
///
/// # Arguments
///
/// * `archive` - Tar archive to read
/// * `dest` - Directory to unpack into
/// * `select` - Maps an archive name to its destination, or skips it
///
/// # Example
///
/// ```rust,ignore
/// use fastr_release::artifact::tarball::extract_matching;
///
/// // Unpack only the jars, flattened into `staging/`
/// let count = extract_matching(&release_tar, &staging, |name| {
///     name.strip_prefix("bin/fastr_jars/").map(str::to_string)
/// })?;
/// ```
pub fn extract_matching<F>(archive: &Path, dest: &Path, mut select: F) -> Result<usize>
where
    F: FnMut(&str) -> Option<String>,
{
    let file = File::open(archive)
        .with_context(|| format!("opening archive '{}'", archive.display()))?;
    let mut tar = tar::Archive::new(file);

    let mut unpacked = 0;
    for entry in tar
        .entries()
        .with_context(|| format!("reading archive '{}'", archive.display()))?
    {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let name = name.trim_start_matches("./").trim_end_matches('/');
        // The archive root itself
        if name.is_empty() {
            continue;
        }
        let Some(rel) = select(name) else {
            continue;
        };
        if rel.is_empty() {
            continue;
        }

        let target = dest.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        // Files and links left by an earlier rule are replaced
        if target.symlink_metadata().is_ok() && !target.is_dir() {
            fs::remove_file(&target)
                .with_context(|| format!("replacing '{}'", target.display()))?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("unpacking '{name}' from '{}'", archive.display()))?;
        unpacked += 1;
    }
    Ok(unpacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/R"), "#!/usr/bin/env bash\n").unwrap();
        fs::set_permissions(root.join("bin/R"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/libR.so.1"), "elf").unwrap();
        std::os::unix::fs::symlink("libR.so.1", root.join("lib/libR.so")).unwrap();
    }

    #[test]
    fn test_directory_entries_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        sample_tree(temp.path());

        let names: Vec<_> = directory_entries(temp.path())
            .unwrap()
            .into_iter()
            .map(|e| e.arcname)
            .collect();

        assert_eq!(
            names,
            vec!["bin", "bin/R", "lib", "lib/libR.so", "lib/libR.so.1"]
        );
    }

    #[test]
    fn test_tar_is_deterministic_and_keeps_links() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        sample_tree(&root);
        let entries = directory_entries(&root).unwrap();

        let first = temp.path().join("a.tar");
        let second = temp.path().join("b.tar");
        write_tar(&entries, &first).unwrap();
        write_tar(&entries, &second).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        let out = temp.path().join("out");
        let count = extract_matching(&first, &out, |name| Some(name.to_string())).unwrap();
        assert_eq!(count, 5);
        assert!(out.join("lib/libR.so").is_symlink());
        let mode = fs::metadata(out.join("bin/R")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_matching_renames_and_filters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        sample_tree(&root);
        let archive = temp.path().join("a.tar");
        write_tar(&directory_entries(&root).unwrap(), &archive).unwrap();

        let out = temp.path().join("out");
        let count = extract_matching(&archive, &out, |name| {
            name.strip_prefix("lib/").map(|rest| format!("native/{rest}"))
        })
        .unwrap();

        assert_eq!(count, 2);
        assert!(out.join("native/libR.so.1").is_file());
        assert!(!out.join("bin").exists());
    }

    #[test]
    fn test_extract_matching_replaces_existing_files_and_links() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        sample_tree(&root);
        let archive = temp.path().join("a.tar");
        write_tar(&directory_entries(&root).unwrap(), &archive).unwrap();

        let out = temp.path().join("out");
        fs::create_dir_all(out.join("lib")).unwrap();
        fs::write(out.join("lib/libR.so.1"), "stale").unwrap();
        std::os::unix::fs::symlink("elsewhere", out.join("lib/libR.so")).unwrap();

        extract_matching(&archive, &out, |name| Some(name.to_string())).unwrap();

        assert_eq!(fs::read_to_string(out.join("lib/libR.so.1")).unwrap(), "elf");
        assert_eq!(
            fs::read_link(out.join("lib/libR.so")).unwrap(),
            PathBuf::from("libR.so.1")
        );
    }
}
