//! Stage 4: make `bin/R` relocatable.
//!
//! The generic GNU R launcher hardcodes its install prefix in `R_HOME_DIR=`.
//! That assignment is swapped for a snippet computing the home directory
//! from the script's real location, following symlink chains by hand since
//! `readlink -f` is not portable to macOS.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::filesystem::replace_file_contents;

/// Prefix of the line being replaced.
pub const HOME_ASSIGNMENT_PREFIX: &str = "R_HOME_DIR=";

/// Shebang of the upstream launcher.
pub const POSIX_SHEBANG: &str = "#!/bin/sh";

/// The snippet relies on `BASH_SOURCE` and `[[`, hence bash.
pub const BASH_SHEBANG: &str = "#!/usr/bin/env bash\n";

/// Replacement for the `R_HOME_DIR=` line.
pub const HOME_RESOLUTION_SNIPPET: &str = r#"
source="${BASH_SOURCE[0]}"
while [ -h "$source" ] ; do
  prev_source="$source"
  source="$(readlink "$source")";
  if [[ "$source" != /* ]]; then
    # if the link was relative, it was relative to where it came from
    dir="$( cd -P "$( dirname "$prev_source" )" && pwd )"
    source="$dir/$source"
  fi
done
r_bin="$( cd -P "$( dirname "$source" )" && pwd )"
R_HOME_DIR="$( dirname "$r_bin" )"
"#;

/// Rewrite launcher text, returning the new text.
pub fn canonicalize_launcher_text(script: &str) -> String {
    let mut out = String::with_capacity(script.len() + HOME_RESOLUTION_SNIPPET.len());
    for line in script.split_inclusive('\n') {
        if line.starts_with(HOME_ASSIGNMENT_PREFIX) {
            out.push_str(HOME_RESOLUTION_SNIPPET);
        } else if line.trim() == POSIX_SHEBANG {
            out.push_str(BASH_SHEBANG);
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Rewrite the launcher script at `path` in place.
pub fn canonicalize_launcher(path: &Path) -> Result<()> {
    let script = fs::read_to_string(path)
        .with_context(|| format!("reading launcher '{}'", path.display()))?;
    let rewritten = canonicalize_launcher_text(&script);
    replace_file_contents(path, rewritten.as_bytes())
        .with_context(|| format!("rewriting launcher '{}'", path.display()))?;
    debug!(launcher = %path.display(), "canonicalized R_HOME_DIR");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const SCRIPT: &str = "#!/bin/sh\n# Shell wrapper for R executable.\n\nR_HOME_DIR=/opt/r\nexport R_HOME_DIR\necho hi\n";

    #[test]
    fn test_rewrites_home_and_shebang() {
        let out = canonicalize_launcher_text(SCRIPT);

        assert_eq!(out.matches(HOME_RESOLUTION_SNIPPET).count(), 1);
        assert_eq!(out.matches("#!").count(), 1);
        assert!(out.starts_with(BASH_SHEBANG));
        assert!(!out.contains("R_HOME_DIR=/opt/r"));
    }

    #[test]
    fn test_other_lines_unchanged_and_ordered() {
        let out = canonicalize_launcher_text(SCRIPT);

        let export = out.find("export R_HOME_DIR\n").unwrap();
        let echo = out.find("echo hi\n").unwrap();
        let comment = out.find("# Shell wrapper for R executable.\n").unwrap();
        assert!(comment < export && export < echo);
        assert!(out.ends_with("export R_HOME_DIR\necho hi\n"));
    }

    #[test]
    fn test_shebang_with_trailing_space_is_normalized() {
        let out = canonicalize_launcher_text("#!/bin/sh  \necho hi");
        assert_eq!(out, "#!/usr/bin/env bash\necho hi");
    }

    #[test]
    fn test_indented_assignment_is_left_alone() {
        let script = "  R_HOME_DIR=/keep\n";
        assert_eq!(canonicalize_launcher_text(script), script);
    }

    #[test]
    fn test_canonicalize_in_place_keeps_executable_bit() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("R");
        fs::write(&path, SCRIPT).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        canonicalize_launcher(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("r_bin=\"$( cd -P \"$( dirname \"$source\" )\" && pwd )\""));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
