//! Stage 2: rebuild `lib/` one entry at a time.
//!
//! A plain recursive copy would dereference `libR.so -> libR.so.1` style
//! aliases and duplicate the shared objects, so links are recreated with
//! their literal target instead.

use anyhow::{Context, Result};
use std::fs;
use tracing::debug;

use super::filesystem::{
    copy_dir_preserving_links, copy_file_with_metadata, copy_symlink, remove_dir_if_exists,
};
use crate::config::ReleaseConfig;

/// Name of the native library directory.
pub const LIB_DIR: &str = "lib";

/// macOS Finder metadata, never part of a release.
const HOUSEKEEPING_FILES: &[&str] = &[".DS_Store"];

/// Counts of what ended up in the rebuilt library directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryRebuild {
    pub files: usize,
    pub links: usize,
}

/// Delete and recreate `<release>/lib` from `<suite>/lib`.
pub fn rebuild_library_dir(config: &ReleaseConfig) -> Result<LibraryRebuild> {
    let source_dir = config.suite_dir.join(LIB_DIR);
    let target_dir = config.release_dir.join(LIB_DIR);

    remove_dir_if_exists(&target_dir)?;
    fs::create_dir(&target_dir)
        .with_context(|| format!("creating library directory '{}'", target_dir.display()))?;

    let mut counts = LibraryRebuild::default();
    for entry in fs::read_dir(&source_dir)
        .with_context(|| format!("reading library directory '{}'", source_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if HOUSEKEEPING_FILES.iter().any(|skip| name == *skip) {
            continue;
        }

        let source = entry.path();
        let target = target_dir.join(&name);
        let file_type = entry
            .file_type()
            .with_context(|| format!("reading file type of '{}'", source.display()))?;

        if file_type.is_symlink() {
            copy_symlink(&source, &target)?;
            counts.links += 1;
        } else if file_type.is_dir() {
            copy_dir_preserving_links(&source, &target)?;
            counts.files += 1;
        } else {
            copy_file_with_metadata(&source, &target)?;
            counts.files += 1;
        }
    }

    debug!(
        files = counts.files,
        links = counts.links,
        "rebuilt release library directory"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseFlags;
    use std::collections::BTreeMap;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> ReleaseConfig {
        let suite = temp.path().join("fastr");
        let lib = suite.join(LIB_DIR);
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("libR.so.1"), "shared object").unwrap();
        fs::set_permissions(lib.join("libR.so.1"), fs::Permissions::from_mode(0o755)).unwrap();
        symlink("libR.so.1", lib.join("libR.so")).unwrap();
        fs::write(lib.join(".DS_Store"), "finder").unwrap();
        fs::create_dir_all(suite.join("com.oracle.truffle.r.release")).unwrap();
        ReleaseConfig::with_defaults(&suite, ReleaseFlags::default(), temp.path().join("cache"))
    }

    fn snapshot(dir: &Path) -> BTreeMap<String, String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let name = e.file_name().to_string_lossy().into_owned();
                let value = if e.file_type().unwrap().is_symlink() {
                    format!("-> {}", fs::read_link(e.path()).unwrap().display())
                } else {
                    fs::read_to_string(e.path()).unwrap()
                };
                (name, value)
            })
            .collect()
    }

    #[test]
    fn test_links_are_reproduced_not_resolved() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);

        let counts = rebuild_library_dir(&config).unwrap();

        let lib = config.release_dir.join(LIB_DIR);
        assert_eq!(counts, LibraryRebuild { files: 1, links: 1 });
        assert!(lib.join("libR.so").is_symlink());
        assert_eq!(
            fs::read_link(lib.join("libR.so")).unwrap().to_str().unwrap(),
            "libR.so.1"
        );
        let mode = fs::metadata(lib.join("libR.so.1")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_housekeeping_files_skipped() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);

        rebuild_library_dir(&config).unwrap();

        assert!(!config.release_dir.join("lib/.DS_Store").exists());
    }

    #[test]
    fn test_rebuild_is_idempotent_and_drops_leftovers() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        let lib = config.release_dir.join(LIB_DIR);
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("libold.so"), "previous run").unwrap();

        rebuild_library_dir(&config).unwrap();
        let first = snapshot(&lib);
        rebuild_library_dir(&config).unwrap();
        let second = snapshot(&lib);

        assert_eq!(first, second);
        assert!(!first.contains_key("libold.so"));
    }
}
