//! Archive writers for the registered distributions.
//!
//! - [`jar`] - zip-format jar bundles with participant hooks
//! - [`tarball`] - deterministic tar archives and filtered extraction
//! - [`participant`] - hooks the host build tool runs around jar writing
//! - [`results`] - the files the release project contributes
//!
//! [`Packager`] ties them together: it looks a descriptor up in a
//! [`Registration`] and writes its archive below the configured output
//! directory, followed by a `.sha256` sidecar.

pub mod jar;
pub mod participant;
pub mod results;
pub mod tarball;

use anyhow::{bail, Context, Result};
use glob::Pattern;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::build::filesystem::{copy_file_with_metadata, remove_dir_if_exists};
use crate::config::ReleaseConfig;
use crate::distribution::layout::unqualified;
use crate::distribution::{
    DistributionDescriptor, DistributionKind, LayoutEntry, LayoutSource, Registration,
};

pub use participant::{participant_for, ArchiveParticipant, PassiveParticipant};
pub use results::release_results;
use tarball::ArchiveEntry;

/// Staging area for layout archives, relative to the output directory.
const LAYOUT_STAGING_DIR: &str = "mxbuild/layouts";

/// An archive written by [`Packager::package`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub name: String,
    pub path: PathBuf,
    pub sha256: String,
    pub entries: usize,
}

/// Bookkeeping of one [`Packager::package`] call.
#[derive(Debug, Default)]
struct PackageRun {
    /// Distributions being packaged, outermost first.
    stack: Vec<String>,
    /// Archives already written during this call.
    packaged: BTreeMap<String, PathBuf>,
}

/// Writes distribution archives.
pub struct Packager<'a> {
    config: &'a ReleaseConfig,
    registration: &'a Registration,
}

impl<'a> Packager<'a> {
    pub fn new(config: &'a ReleaseConfig, registration: &'a Registration) -> Self {
        Self {
            config,
            registration,
        }
    }

    /// Where the archive of `descriptor` is written.
    pub fn archive_path(&self, descriptor: &DistributionDescriptor) -> PathBuf {
        let (os, arch) = host_platform();
        let relative = match &descriptor.path {
            Some(path) => path.clone(),
            None => default_archive_path(&descriptor.name),
        };
        let relative = relative.replace("<os>", os).replace("<arch>", arch);
        self.config.output_dir.join(relative)
    }

    /// Write the archive of the distribution called `name`.
    pub fn package(&self, name: &str) -> Result<PackagedArchive> {
        self.package_in_run(name, &mut PackageRun::default())
    }

    fn package_in_run(&self, name: &str, run: &mut PackageRun) -> Result<PackagedArchive> {
        let Some(descriptor) = self.registration.find(name) else {
            bail!(
                "unknown distribution '{name}', registered: {}",
                self.registration.names().join(", ")
            );
        };
        if run.stack.iter().any(|n| n == name) {
            bail!(
                "distribution '{name}' depends on itself: {} -> {name}",
                run.stack.join(" -> ")
            );
        }
        run.stack.push(name.to_string());

        let out_path = self.archive_path(descriptor);
        info!(distribution = name, archive = %out_path.display(), "packaging distribution");

        let entries = match &descriptor.kind {
            DistributionKind::Jar => self.write_release_jar(descriptor, &out_path)?,
            DistributionKind::NativeTar { relpath } => {
                self.write_release_tar(*relpath, &out_path)?
            }
            DistributionKind::LayoutTar { layout } => {
                self.write_layout_tar(name, layout, &out_path, run)?
            }
        };
        run.stack.pop();

        let sha256 = write_sha256_sidecar(&out_path)?;
        run.packaged.insert(name.to_string(), out_path.clone());
        info!(distribution = name, entries, sha256 = %sha256, "distribution packaged");
        Ok(PackagedArchive {
            name: name.to_string(),
            path: out_path,
            sha256,
            entries,
        })
    }

    fn release_entries(&self, root: &Path) -> Result<Vec<ArchiveEntry>> {
        release_results(self.config)?
            .into_iter()
            .map(|path| {
                Ok(ArchiveEntry {
                    arcname: tarball::arcname_for(root, &path)?,
                    path,
                })
            })
            .collect()
    }

    fn write_release_jar(
        &self,
        descriptor: &DistributionDescriptor,
        out_path: &Path,
    ) -> Result<usize> {
        let entries = self.release_entries(&self.config.release_dir)?;
        let mut participant = participant_for(descriptor, self.config);
        jar::write_jar(&entries, out_path, participant.as_mut())
            .with_context(|| format!("writing jar distribution '{}'", descriptor.name))
    }

    fn write_release_tar(&self, relpath: bool, out_path: &Path) -> Result<usize> {
        let root = if relpath {
            &self.config.release_dir
        } else {
            &self.config.suite_dir
        };
        let entries = self.release_entries(root)?;
        tarball::write_tar(&entries, out_path)?;
        Ok(entries.len())
    }

    fn write_layout_tar(
        &self,
        name: &str,
        layout: &[LayoutEntry],
        out_path: &Path,
        run: &mut PackageRun,
    ) -> Result<usize> {
        let staging = self
            .config
            .output_dir
            .join(LAYOUT_STAGING_DIR)
            .join(name.to_lowercase());
        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating '{}'", staging.display()))?;

        for entry in layout {
            for source in &entry.sources {
                debug!(destination = %entry.destination, source = %source, "applying layout rule");
                self.apply_layout_source(&staging, entry, source, run)
                    .with_context(|| {
                        format!(
                            "layout of '{name}': '{}' <- {source}",
                            entry.destination
                        )
                    })?;
            }
        }

        let entries = tarball::directory_entries(&staging)?;
        tarball::write_tar(&entries, out_path)?;
        remove_dir_if_exists(&staging)?;
        Ok(entries.len())
    }

    fn apply_layout_source(
        &self,
        staging: &Path,
        entry: &LayoutEntry,
        source: &LayoutSource,
        run: &mut PackageRun,
    ) -> Result<()> {
        let destination = destination_path(&entry.destination);
        match source {
            LayoutSource::ExtractedDependency {
                dependency,
                path,
                exclude,
            } => {
                if !entry.is_directory() {
                    bail!("filtered extraction needs a directory destination");
                }
                let archive = self.dependency_archive(dependency, run)?;
                let pattern = Pattern::new(path)
                    .with_context(|| format!("invalid layout pattern '{path}'"))?;
                let exclude = exclude
                    .iter()
                    .map(|e| Pattern::new(e).with_context(|| format!("invalid exclusion '{e}'")))
                    .collect::<Result<Vec<_>>>()?;
                let prefix = literal_dir_prefix(path);

                let count = tarball::extract_matching(&archive, staging, |name| {
                    if !pattern.matches(name) || is_excluded(name, &exclude) {
                        return None;
                    }
                    let rel = name.strip_prefix(prefix).unwrap_or(name);
                    Some(join_relative(destination, rel))
                })?;
                debug!(dependency = %dependency, pattern = %path, count, "extracted dependency entries");
            }
            LayoutSource::ExtractedFile { dependency, path } => {
                let archive = self.dependency_archive(dependency, run)?;
                let target = if entry.is_directory() {
                    join_relative(destination, file_name(path))
                } else {
                    destination.to_string()
                };
                let count = tarball::extract_matching(&archive, staging, |name| {
                    (name == path.as_str()).then(|| target.clone())
                })?;
                if count == 0 {
                    bail!("'{path}' not found in '{}'", archive.display());
                }
            }
            LayoutSource::File { path } => {
                let src = self.config.suite_dir.join(path);
                self.stage_file(staging, entry, destination, &src)?;
            }
            LayoutSource::Dependency { dependency } => {
                let src = self.external_artifact(dependency, run)?;
                self.stage_file(staging, entry, destination, &src)?;
            }
        }
        Ok(())
    }

    fn stage_file(
        &self,
        staging: &Path,
        entry: &LayoutEntry,
        destination: &str,
        src: &Path,
    ) -> Result<()> {
        if !src.is_file() {
            bail!("layout input '{}' is not a file", src.display());
        }
        let rel = if entry.is_directory() {
            let name = src
                .file_name()
                .with_context(|| format!("'{}' has no file name", src.display()))?;
            join_relative(destination, &name.to_string_lossy())
        } else {
            destination.to_string()
        };
        let target = staging.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        copy_file_with_metadata(src, &target)
    }

    /// Archive of a registered distribution, repackaged once per run so
    /// layouts never read an archive older than the release tree.
    fn dependency_archive(&self, dependency: &str, run: &mut PackageRun) -> Result<PathBuf> {
        let name = unqualified(dependency);
        if self.registration.find(name).is_none() {
            bail!("layout dependency '{dependency}' is not a registered distribution");
        }
        if let Some(archive) = run.packaged.get(name) {
            return Ok(archive.clone());
        }
        debug!(dependency = name, "packaging layout dependency");
        Ok(self.package_in_run(name, run)?.path)
    }

    /// Artifact for a `dependency:` rule: a configured path, falling back to
    /// a registered distribution's archive.
    fn external_artifact(&self, dependency: &str, run: &mut PackageRun) -> Result<PathBuf> {
        if let Some(path) = self.config.dependencies.get(dependency) {
            return Ok(path.clone());
        }
        if self.registration.find(unqualified(dependency)).is_some() {
            return self.dependency_archive(dependency, run);
        }
        bail!(
            "no artifact configured for dependency '{dependency}'; add it under [dependencies] in the release config"
        )
    }
}

/// Platform names as the host build tool spells them.
pub fn host_platform() -> (&'static str, &'static str) {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        other => other,
    };
    (os, arch)
}

fn default_archive_path(name: &str) -> String {
    format!(
        "mxbuild/dists/<os>/<arch>/{}.tar",
        name.to_lowercase().replace('_', "-")
    )
}

/// Layout destination relative to the staging root: `./` and a leading `./`
/// are dropped, as is a trailing `/`.
fn destination_path(destination: &str) -> &str {
    let trimmed = destination.strip_prefix("./").unwrap_or(destination);
    trimmed.trim_end_matches('/')
}

fn join_relative(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else {
        format!("{dir}/{rel}")
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Directory part of `pattern` before its first wildcard, with the trailing
/// `/`. `bin/fastr_jars/*` gives `bin/fastr_jars/`, `*` gives the empty string.
fn literal_dir_prefix(pattern: &str) -> &str {
    let literal_end = pattern.find(['*', '?', '[']).unwrap_or(pattern.len());
    match pattern[..literal_end].rfind('/') {
        Some(slash) => &pattern[..=slash],
        None => "",
    }
}

/// An exclusion matching a directory covers everything below it.
fn is_excluded(name: &str, exclude: &[Pattern]) -> bool {
    let mut candidate = name;
    loop {
        if exclude.iter().any(|p| p.matches(candidate)) {
            return true;
        }
        match candidate.rsplit_once('/') {
            Some((parent, _)) => candidate = parent,
            None => return false,
        }
    }
}

/// Hash `archive` and write the hex digest to `<archive>.sha256`.
pub fn write_sha256_sidecar(archive: &Path) -> Result<String> {
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let sha = format!("{:x}", hasher.finalize());

    let mut sidecar = archive.as_os_str().to_owned();
    sidecar.push(".sha256");
    fs::write(&sidecar, format!("{sha}\n"))
        .with_context(|| format!("writing '{}'", Path::new(&sidecar).display()))?;
    Ok(sha)
}
