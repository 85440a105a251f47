//! Stage 1: mirror the release directories from the suite.

use anyhow::{Context, Result};
use tracing::debug;

use super::filesystem::{mirror_dir, remove_dir_if_exists};
use crate::config::ReleaseConfig;

/// Top-level directories copied wholesale into the release root.
///
/// `lib` is handled by [`super::library`], which keeps shared-object links.
pub const MIRRORED_DIRS: &[&str] = &["bin", "include", "library", "etc", "share", "doc"];

/// Replace each mirrored directory of the release root with a fresh copy.
///
/// Returns the number of files copied.
pub fn mirror_release_dirs(config: &ReleaseConfig) -> Result<u64> {
    let mut total = 0;
    for name in MIRRORED_DIRS {
        let source = config.suite_dir.join(name);
        let target = config.release_dir.join(name);

        if remove_dir_if_exists(&target)? {
            debug!(dir = %target.display(), "removed stale release directory");
        }
        let copied = mirror_dir(&source, &target)
            .with_context(|| format!("mirroring release directory '{name}'"))?;
        debug!(dir = name, files = copied, "mirrored release directory");
        total += copied;
    }
    Ok(total)
}
