//! Stage 3: COPYRIGHT, LICENSE and README.md at the release root.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ReleaseConfig;

/// Suffix of the per-component copyright fragments.
pub const COPYRIGHT_SUFFIX: &str = "copyright.star";

/// Files copied verbatim from the suite root.
pub const ROOT_FILES: &[&str] = &["LICENSE", "README.md"];

/// Name of the assembled copyright file.
pub const COPYRIGHT_FILE: &str = "COPYRIGHT";

/// Copyright fragments in `dir`, sorted by file name.
pub fn copyright_fragments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut fragments = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("reading copyrights directory '{}'", dir.display()))?
    {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(COPYRIGHT_SUFFIX));
        if matches {
            fragments.push(entry.path());
        }
    }
    fragments.sort();
    Ok(fragments)
}

/// Concatenate the copyright fragments and copy LICENSE/README.md.
///
/// Returns the number of fragments written.
pub fn assemble_metadata(config: &ReleaseConfig) -> Result<usize> {
    let fragments = copyright_fragments(&config.copyrights_dir())?;

    let output = config.release_dir.join(COPYRIGHT_FILE);
    let mut writer = File::create(&output)
        .with_context(|| format!("creating '{}'", output.display()))?;
    for fragment in &fragments {
        let mut reader = File::open(fragment)
            .with_context(|| format!("opening copyright fragment '{}'", fragment.display()))?;
        io::copy(&mut reader, &mut writer)
            .with_context(|| format!("appending '{}'", fragment.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("writing '{}'", output.display()))?;

    for name in ROOT_FILES {
        let src = config.suite_dir.join(name);
        let dst = config.release_dir.join(name);
        fs::copy(&src, &dst)
            .with_context(|| format!("copying '{}' -> '{}'", src.display(), dst.display()))?;
    }

    debug!(fragments = fragments.len(), "assembled release metadata");
    Ok(fragments.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseFlags;
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> ReleaseConfig {
        let suite = temp.path().join("fastr");
        let copyrights = suite.join("mx.fastr/copyrights");
        fs::create_dir_all(&copyrights).unwrap();
        fs::write(copyrights.join("gnu_r.copyright.star"), "GNU R\n").unwrap();
        fs::write(copyrights.join("oracle.copyright.star"), "Oracle\n").unwrap();
        fs::write(copyrights.join("overrides"), "not a fragment\n").unwrap();
        fs::write(copyrights.join("bsd.copyright.star"), "BSD\n").unwrap();
        fs::write(suite.join("LICENSE"), "GPLv3").unwrap();
        fs::write(suite.join("README.md"), "# FastR").unwrap();
        fs::create_dir_all(suite.join("com.oracle.truffle.r.release")).unwrap();
        ReleaseConfig::with_defaults(&suite, ReleaseFlags::default(), temp.path().join("cache"))
    }

    #[test]
    fn test_fragments_concatenated_in_listing_order() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);

        let written = assemble_metadata(&config).unwrap();

        assert_eq!(written, 3);
        let copyright = fs::read_to_string(config.release_dir.join(COPYRIGHT_FILE)).unwrap();
        assert_eq!(copyright, "BSD\nGNU R\nOracle\n");
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);

        assemble_metadata(&config).unwrap();
        let first = fs::read(config.release_dir.join(COPYRIGHT_FILE)).unwrap();
        assemble_metadata(&config).unwrap();
        let second = fs::read(config.release_dir.join(COPYRIGHT_FILE)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_license_and_readme_overwritten() {
        let temp = TempDir::new().unwrap();
        let config = setup(&temp);
        fs::write(config.release_dir.join("LICENSE"), "stale").unwrap();

        assemble_metadata(&config).unwrap();

        assert_eq!(
            fs::read_to_string(config.release_dir.join("LICENSE")).unwrap(),
            "GPLv3"
        );
        assert_eq!(
            fs::read_to_string(config.release_dir.join("README.md")).unwrap(),
            "# FastR"
        );
    }
}
