//! Classpath entries required by the packaged runtime.
//!
//! The host build tool owns classpath resolution. It hands the resolved,
//! ordered entries to us through a [`ClasspathSource`]; the standard source
//! is a JSON manifest it writes before invoking the release build.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One archive the runtime loads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathEntry {
    /// Logical library or distribution name (e.g. `ANTLR4`).
    pub name: String,
    /// Absolute path of the archive.
    pub path: PathBuf,
    /// Whether the archive came from the shared dependency cache.
    pub from_cache: bool,
}

impl ClasspathEntry {
    /// File name the archive gets under `bin/fastr_jars`.
    ///
    /// Cache entries carry hashed, versioned file names, so they are renamed
    /// after their logical name; locally built archives keep theirs.
    pub fn jar_file_name(&self) -> Result<String> {
        if self.from_cache {
            return Ok(format!("{}.jar", normalize_jar_name(&self.name)));
        }
        let base = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| {
                format!(
                    "classpath entry '{}' has no file name: {}",
                    self.name,
                    self.path.display()
                )
            })?;
        Ok(base.to_string())
    }
}

/// Lowercase a logical name and turn underscores into hyphens.
pub fn normalize_jar_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// Ordered classpath resolution for a distribution.
pub trait ClasspathSource {
    /// Entries required by `distribution`, in classpath order.
    fn entries(&self, distribution: &str) -> Result<Vec<ClasspathEntry>>;
}

/// Decides whether an archive path lives in the dependency cache.
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    name: String,
    path: PathBuf,
    #[serde(default)]
    from_cache: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    /// `{"FASTR": [...], "FASTR_LAUNCHER": [...]}`
    PerDistribution(std::collections::BTreeMap<String, Vec<ManifestEntry>>),
    /// A bare list, used for every distribution.
    Flat(Vec<ManifestEntry>),
}

/// Classpath read from a JSON manifest written by the host build tool.
#[derive(Debug, Clone)]
pub struct ManifestClasspath {
    manifest: PathBuf,
    cache: CachePaths,
}

impl ManifestClasspath {
    pub fn new(manifest: impl Into<PathBuf>, cache: CachePaths) -> Self {
        Self {
            manifest: manifest.into(),
            cache,
        }
    }
}

impl ClasspathSource for ManifestClasspath {
    fn entries(&self, distribution: &str) -> Result<Vec<ClasspathEntry>> {
        let raw = fs::read_to_string(&self.manifest).with_context(|| {
            format!("reading classpath manifest '{}'", self.manifest.display())
        })?;
        let parsed: ManifestFile = serde_json::from_str(&raw).with_context(|| {
            format!("parsing classpath manifest '{}'", self.manifest.display())
        })?;

        let entries = match parsed {
            ManifestFile::Flat(entries) => entries,
            ManifestFile::PerDistribution(mut by_dist) => {
                by_dist.remove(distribution).with_context(|| {
                    format!(
                        "classpath manifest '{}' has no entries for '{}'",
                        self.manifest.display(),
                        distribution
                    )
                })?
            }
        };

        Ok(entries
            .into_iter()
            .map(|entry| {
                let from_cache = entry
                    .from_cache
                    .unwrap_or_else(|| self.cache.contains(&entry.path));
                ClasspathEntry {
                    name: entry.name,
                    path: entry.path,
                    from_cache,
                }
            })
            .collect())
    }
}

/// Classpath supplied directly, mostly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticClasspath(pub Vec<ClasspathEntry>);

impl ClasspathSource for StaticClasspath {
    fn entries(&self, _distribution: &str) -> Result<Vec<ClasspathEntry>> {
        Ok(self.0.clone())
    }
}
