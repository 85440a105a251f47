//! Release configuration: resolved paths and environment flags.
//!
//! A [`ReleaseConfig`] is built once per invocation and handed by reference
//! to every stage. Nothing below this module reads the process environment.
//!
//! Resolution order, later wins:
//! 1. built-in defaults relative to the suite directory
//! 2. `fastr-release.toml` in the suite directory (or an explicit path)
//! 3. environment flags (`FASTR_RELEASE`, `FASTR_RFFI`, `MX_CACHE_DIR`)
//! 4. CLI overrides applied by the binary

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the release project directory inside the suite.
pub const DEFAULT_RELEASE_PROJECT: &str = "com.oracle.truffle.r.release";

/// Optional per-suite configuration file.
pub const CONFIG_FILE_NAME: &str = "fastr-release.toml";

/// Environment variable that opts into release assembly.
pub const RELEASE_ENV: &str = "FASTR_RELEASE";

/// Environment variable naming the native interface variant being packaged.
pub const RFFI_ENV: &str = "FASTR_RFFI";

/// Environment variable overriding the dependency cache root.
pub const CACHE_DIR_ENV: &str = "MX_CACHE_DIR";

/// Flags that drive both the pipeline and distribution registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseFlags {
    /// `FASTR_RELEASE` is set (to anything).
    pub release: bool,
    /// `FASTR_RELEASE` is set to exactly `true`; enables the GraalVM support
    /// layout and the language component.
    pub graalvm: bool,
    /// Value of `FASTR_RFFI`, appended to every distribution name.
    pub rffi: String,
}

impl ReleaseFlags {
    /// Read the flags from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the flags through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let release_value = lookup(RELEASE_ENV);
        Self {
            release: release_value.is_some(),
            graalvm: release_value.as_deref() == Some("true"),
            rffi: lookup(RFFI_ENV).unwrap_or_default(),
        }
    }

    /// Whether the GraalVM language component is registered.
    ///
    /// Only the default native interface variant ships as a component.
    pub fn registers_component(&self) -> bool {
        self.graalvm && self.rffi.is_empty()
    }
}

/// Everything a pipeline run or packaging run needs to know.
#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    /// Root of the FastR suite: the source tree being released.
    pub suite_dir: PathBuf,
    /// Name of the release project (also its directory name).
    pub release_project: String,
    /// Release root receiving the assembled bundle.
    pub release_dir: PathBuf,
    /// JSON classpath manifest written by the host build tool.
    pub classpath_manifest: PathBuf,
    /// Root of the shared dependency cache.
    pub cache_dir: PathBuf,
    /// Directory where packaged archives land (suite-relative paths in
    /// descriptors are resolved against it).
    pub output_dir: PathBuf,
    /// Externally built artifacts referenced by `dependency:` layout rules,
    /// keyed by `<suite>:<DIST>`.
    pub dependencies: BTreeMap<String, PathBuf>,
    pub flags: ReleaseFlags,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    release: ReleaseToml,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReleaseToml {
    project: Option<String>,
    classpath_manifest: Option<String>,
    cache_dir: Option<String>,
    output_dir: Option<String>,
}

impl ReleaseConfig {
    /// Defaults for a suite, with the given flags and cache root.
    pub fn with_defaults(suite_dir: &Path, flags: ReleaseFlags, cache_dir: PathBuf) -> Self {
        Self {
            suite_dir: suite_dir.to_path_buf(),
            release_project: DEFAULT_RELEASE_PROJECT.to_string(),
            release_dir: suite_dir.join(DEFAULT_RELEASE_PROJECT),
            classpath_manifest: suite_dir.join("mxbuild/fastr.classpath.json"),
            cache_dir,
            output_dir: suite_dir.to_path_buf(),
            dependencies: BTreeMap::new(),
            flags,
        }
    }

    /// Load the configuration for `suite_dir` from the process environment
    /// and the optional config file.
    ///
    /// `config_file` overrides the default `<suite>/fastr-release.toml`; an
    /// explicitly named file must exist, the default one may be absent.
    pub fn load(suite_dir: &Path, config_file: Option<&Path>) -> Result<Self> {
        let flags = ReleaseFlags::from_env();
        let cache_dir = match std::env::var_os(CACHE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => default_cache_dir(),
        };

        let mut config = Self::with_defaults(suite_dir, flags, cache_dir);
        let (path, required) = match config_file {
            Some(path) => (path.to_path_buf(), true),
            None => (suite_dir.join(CONFIG_FILE_NAME), false),
        };
        if required || path.is_file() {
            config.apply_file(&path)?;
        }
        Ok(config)
    }

    /// Overlay the settings of a TOML config file.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading release config '{}'", path.display()))?;
        let parsed: ConfigToml = toml::from_str(&raw)
            .with_context(|| format!("parsing release config '{}'", path.display()))?;

        if let Some(project) = parsed.release.project {
            self.release_dir = self.suite_dir.join(&project);
            self.release_project = project;
        }
        if let Some(manifest) = parsed.release.classpath_manifest {
            self.classpath_manifest = resolve_suite_path(&self.suite_dir, &manifest);
        }
        if let Some(cache_dir) = parsed.release.cache_dir {
            self.cache_dir = resolve_suite_path(&self.suite_dir, &cache_dir);
        }
        if let Some(output_dir) = parsed.release.output_dir {
            self.output_dir = resolve_suite_path(&self.suite_dir, &output_dir);
        }
        for (key, value) in parsed.dependencies {
            let resolved = resolve_suite_path(&self.suite_dir, &value);
            self.dependencies.insert(key, resolved);
        }
        Ok(())
    }

    /// `bin/` of the release root.
    pub fn release_bin_dir(&self) -> PathBuf {
        self.release_dir.join("bin")
    }

    /// Directory holding the per-component copyright fragments.
    pub fn copyrights_dir(&self) -> PathBuf {
        self.suite_dir.join("mx.fastr").join("copyrights")
    }
}

/// Resolve a configured path: absolute paths are kept, relative ones are
/// taken relative to the suite directory.
pub fn resolve_suite_path(suite_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        suite_dir.join(candidate)
    }
}

/// `~/.mx/cache`, or `.mx/cache` relative to the working directory when no
/// home directory is known.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".mx")
        .join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_flags_absent() {
        let flags = ReleaseFlags::from_lookup(lookup(&[]));
        assert_eq!(flags, ReleaseFlags::default());
        assert!(!flags.registers_component());
    }

    #[test]
    fn test_flags_release_any_value() {
        let flags = ReleaseFlags::from_lookup(lookup(&[(RELEASE_ENV, "1")]));
        assert!(flags.release);
        assert!(!flags.graalvm);
    }

    #[test]
    fn test_flags_release_true_enables_graalvm() {
        let flags = ReleaseFlags::from_lookup(lookup(&[(RELEASE_ENV, "true")]));
        assert!(flags.release);
        assert!(flags.graalvm);
        assert!(flags.registers_component());
    }

    #[test]
    fn test_flags_rffi_suppresses_component() {
        let flags =
            ReleaseFlags::from_lookup(lookup(&[(RELEASE_ENV, "true"), (RFFI_ENV, "llvm")]));
        assert_eq!(flags.rffi, "llvm");
        assert!(!flags.registers_component());
    }

    #[test]
    fn test_defaults_layout() {
        let config = ReleaseConfig::with_defaults(
            Path::new("/work/fastr"),
            ReleaseFlags::default(),
            PathBuf::from("/cache"),
        );
        assert_eq!(
            config.release_dir,
            PathBuf::from("/work/fastr/com.oracle.truffle.r.release")
        );
        assert_eq!(
            config.copyrights_dir(),
            PathBuf::from("/work/fastr/mx.fastr/copyrights")
        );
    }

    #[test]
    fn test_apply_file_overrides() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"
[release]
project = "release"
classpath_manifest = "cp.json"
cache_dir = "/var/cache/mx"

[dependencies]
"fastr:FASTR_LAUNCHER" = "mxbuild/dists/fastr-launcher.jar"
"#,
        )
        .unwrap();

        let mut config = ReleaseConfig::with_defaults(
            temp.path(),
            ReleaseFlags::default(),
            PathBuf::from("/cache"),
        );
        config.apply_file(&path).unwrap();

        assert_eq!(config.release_project, "release");
        assert_eq!(config.release_dir, temp.path().join("release"));
        assert_eq!(config.classpath_manifest, temp.path().join("cp.json"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/mx"));
        assert_eq!(
            config.dependencies.get("fastr:FASTR_LAUNCHER"),
            Some(&temp.path().join("mxbuild/dists/fastr-launcher.jar"))
        );
    }

    #[test]
    fn test_apply_file_rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[release]\nbogus = 1\n").unwrap();

        let mut config = ReleaseConfig::with_defaults(
            temp.path(),
            ReleaseFlags::default(),
            PathBuf::from("/cache"),
        );
        assert!(config.apply_file(&path).is_err());
    }
}
