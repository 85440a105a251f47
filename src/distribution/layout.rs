//! Layout rules of a layout-tar distribution.
//!
//! A layout maps destination paths inside the archive to the sources that
//! populate them. Sources are written either structurally or with the
//! build tool's shorthand strings:
//!
//! ```text
//! file:<suite-relative path>
//! dependency:<suite>:<DIST>
//! extracted-dependency:<suite>:<DIST>/<path inside the archive>
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One destination and the sources written to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Archive path; a trailing `/` denotes a directory.
    pub destination: String,
    pub sources: Vec<LayoutSource>,
}

impl LayoutEntry {
    pub fn new(destination: impl Into<String>, sources: Vec<LayoutSource>) -> Self {
        Self {
            destination: destination.into(),
            sources,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.destination.ends_with('/')
    }
}

/// Where layout content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source_type", rename_all = "kebab-case")]
pub enum LayoutSource {
    /// Entries of another distribution's archive matching `path`, minus
    /// anything under an `exclude` pattern.
    ExtractedDependency {
        dependency: String,
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<String>,
    },
    /// A single file pulled out of another distribution's archive.
    ExtractedFile { dependency: String, path: String },
    /// A file relative to the suite directory.
    File { path: String },
    /// The archive of another distribution, copied as is.
    Dependency { dependency: String },
}

impl LayoutSource {
    /// Glob-filtered extraction of `dependency`.
    pub fn extracted(dependency: &str, path: &str, exclude: &[&str]) -> Self {
        Self::ExtractedDependency {
            dependency: dependency.to_string(),
            path: path.to_string(),
            exclude: exclude.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl FromStr for LayoutSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((kind, rest)) = s.split_once(':') else {
            bail!("layout source '{s}' has no source type prefix");
        };
        if rest.is_empty() {
            bail!("layout source '{s}' has an empty argument");
        }

        match kind {
            "file" => Ok(Self::File {
                path: rest.to_string(),
            }),
            "dependency" => Ok(Self::Dependency {
                dependency: rest.to_string(),
            }),
            "extracted-dependency" => {
                let Some((dependency, path)) = split_dependency_path(rest) else {
                    bail!("layout source '{s}' must name a path inside the dependency");
                };
                Ok(Self::ExtractedFile {
                    dependency: dependency.to_string(),
                    path: path.to_string(),
                })
            }
            other => bail!("unsupported layout source type '{other}' in '{s}'"),
        }
    }
}

impl fmt::Display for LayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutSource::File { path } => write!(f, "file:{path}"),
            LayoutSource::Dependency { dependency } => write!(f, "dependency:{dependency}"),
            LayoutSource::ExtractedFile { dependency, path } => {
                write!(f, "extracted-dependency:{dependency}/{path}")
            }
            LayoutSource::ExtractedDependency {
                dependency, path, ..
            } => write!(f, "extracted-dependency:{dependency}/{path} (filtered)"),
        }
    }
}

/// Split `suite:DIST/some/path` into (`suite:DIST`, `some/path`).
fn split_dependency_path(value: &str) -> Option<(&str, &str)> {
    let (dependency, path) = value.split_once('/')?;
    if dependency.is_empty() || path.is_empty() {
        return None;
    }
    Some((dependency, path))
}

/// Drop the `<suite>:` qualifier of a dependency name.
pub fn unqualified(dependency: &str) -> &str {
    dependency
        .rsplit_once(':')
        .map_or(dependency, |(_, name)| name)
}
