//! Files the release project contributes to its distributions.

use anyhow::{Context, Result};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::build::{RELEASE_DIRS, RELEASE_ROOT_FILES};
use crate::config::ReleaseConfig;

/// Every non-directory entry under the release directories, followed by the
/// root metadata files. Empty when the release flag is off.
///
/// Missing release directories contribute nothing. The root files are listed
/// whether or not they exist yet; packaging reports the missing ones.
pub fn release_results(config: &ReleaseConfig) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();
    if !config.flags.release {
        return Ok(results);
    }

    for dir in RELEASE_DIRS {
        let root = config.release_dir.join(dir);
        if !root.is_dir() {
            continue;
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
            if !entry.file_type().is_dir() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        results.extend(files);
    }

    results.extend(RELEASE_ROOT_FILES.iter().map(|f| config.release_dir.join(f)));
    Ok(results)
}
