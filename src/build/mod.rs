//! Release bundle assembly.
//!
//! [`ReleaseBuildTask::build`] runs five stages in order against the release
//! root of a [`ReleaseConfig`]:
//!
//! 1. [`mirror`] - replace bin, include, library, etc, share, doc
//! 2. [`library`] - rebuild lib, keeping shared-object symlinks
//! 3. [`metadata`] - COPYRIGHT, LICENSE, README.md
//! 4. [`launcher`] - make `bin/R` compute its own home directory
//! 5. [`jars`] - copy runtime jars and render the Java launchers
//!
//! A failing stage aborts the run and leaves the release root as far as it
//! got; re-running the build from scratch is the recovery path.

pub mod filesystem;
pub mod jars;
pub mod launcher;
pub mod library;
pub mod metadata;
pub mod mirror;
pub mod template;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::classpath::ClasspathSource;
use crate::config::{ReleaseConfig, RELEASE_ENV};

pub use jars::JavaLaunchers;
pub use library::LibraryRebuild;

/// Top-level directories of a release bundle.
pub const RELEASE_DIRS: &[&str] = &["bin", "include", "lib", "library", "etc", "share", "doc"];

/// Files at the release root besides [`RELEASE_DIRS`].
pub const RELEASE_ROOT_FILES: &[&str] = &["LICENSE", "COPYRIGHT", "README.md"];

/// Result of a build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The opt-in flag was not set; nothing was touched.
    Skipped,
    Assembled(ReleaseSummary),
}

/// What an assembly run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub release_dir: PathBuf,
    pub mirrored_files: u64,
    pub library: LibraryRebuild,
    pub copyright_fragments: usize,
    pub launchers: JavaLaunchers,
}

/// Build task of the release project.
pub struct ReleaseBuildTask<'a> {
    config: &'a ReleaseConfig,
    classpath: &'a dyn ClasspathSource,
}

impl<'a> ReleaseBuildTask<'a> {
    pub fn new(config: &'a ReleaseConfig, classpath: &'a dyn ClasspathSource) -> Self {
        Self { config, classpath }
    }

    /// Assemble the release bundle, or skip when the release flag is off.
    pub fn build(&self) -> Result<BuildOutcome> {
        if !self.config.flags.release {
            info!("FastR: set {RELEASE_ENV} to update release project");
            return Ok(BuildOutcome::Skipped);
        }

        let config = self.config;
        info!(release_dir = %config.release_dir.display(), "assembling FastR release");

        let mirrored_files =
            mirror::mirror_release_dirs(config).context("mirroring release directories")?;
        let library =
            library::rebuild_library_dir(config).context("rebuilding release library directory")?;
        let copyright_fragments =
            metadata::assemble_metadata(config).context("assembling release metadata")?;
        launcher::canonicalize_launcher(&config.release_bin_dir().join("R"))
            .context("canonicalizing R launcher")?;
        let launchers = jars::materialize_java_launchers(config, self.classpath)
            .context("materializing Java launchers")?;

        info!(
            files = mirrored_files,
            jars = launchers.jars.len(),
            "FastR release assembled"
        );

        Ok(BuildOutcome::Assembled(ReleaseSummary {
            release_dir: config.release_dir.clone(),
            mirrored_files,
            library,
            copyright_fragments,
            launchers,
        }))
    }
}
