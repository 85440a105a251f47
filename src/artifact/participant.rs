//! Archive participants: hooks the packager calls while writing a jar.
//!
//! The four hooks mirror the host build tool's protocol. Every hook has a
//! no-op default, so a participant only implements what it cares about.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::build::filesystem::remove_dir_if_exists;
use crate::config::ReleaseConfig;
use crate::distribution::{DistributionDescriptor, RELEASE_JAR_BASE};

pub trait ArchiveParticipant {
    /// The archive at `archive` was opened for writing.
    fn opened(&mut self, _archive: &Path) -> Result<()> {
        Ok(())
    }

    /// Offered every binary entry before it is written. Returning `true`
    /// means the participant handled it and the packager must skip it.
    fn add(&mut self, _arcname: &str, _contents: &[u8]) -> Result<bool> {
        Ok(false)
    }

    /// Same as [`ArchiveParticipant::add`] for source archives.
    fn add_source(&mut self, _arcname: &str, _contents: &[u8]) -> Result<bool> {
        Ok(false)
    }

    /// The archive is about to be closed.
    fn closing(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Participant for every jar that needs no special handling.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveParticipant;

impl ArchiveParticipant for PassiveParticipant {}

/// Deletes the copied-in `include/` directory from the release project once
/// the release jar is written. The headers must not stay in the source tree.
#[derive(Debug, Clone)]
pub struct ReleaseSourceCleanup {
    distribution: String,
    first_dependency: Option<String>,
    release_project: String,
    release_dir: PathBuf,
    release_enabled: bool,
}

impl ReleaseSourceCleanup {
    pub fn new(descriptor: &DistributionDescriptor, config: &ReleaseConfig) -> Self {
        Self {
            distribution: descriptor.name.clone(),
            first_dependency: descriptor.dependencies.first().cloned(),
            release_project: config.release_project.clone(),
            release_dir: config.release_dir.clone(),
            release_enabled: config.flags.release,
        }
    }
}

impl ArchiveParticipant for ReleaseSourceCleanup {
    fn closing(&mut self) -> Result<()> {
        if !self.distribution.contains(RELEASE_JAR_BASE) || !self.release_enabled {
            return Ok(());
        }

        if self.first_dependency.as_deref() != Some(self.release_project.as_str()) {
            bail!(
                "distribution '{}' must depend on release project '{}' first, found {:?}",
                self.distribution,
                self.release_project,
                self.first_dependency
            );
        }

        let include_dir = self.release_dir.join("include");
        if remove_dir_if_exists(&include_dir)? {
            info!(dir = %include_dir.display(), "removed packaged include directory from release project");
        }
        Ok(())
    }
}

/// Participant attached to a jar distribution.
///
/// Non-jar distributions are written without participants.
pub fn participant_for(
    descriptor: &DistributionDescriptor,
    config: &ReleaseConfig,
) -> Box<dyn ArchiveParticipant> {
    if descriptor.is_jar() && descriptor.name.contains(RELEASE_JAR_BASE) {
        Box::new(ReleaseSourceCleanup::new(descriptor, config))
    } else {
        Box::new(PassiveParticipant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseFlags;
    use crate::distribution::{build_distribution_descriptors, DistributionKind};
    use std::fs;
    use tempfile::TempDir;

    fn config(temp: &TempDir, release: bool) -> ReleaseConfig {
        let flags = ReleaseFlags {
            release,
            ..ReleaseFlags::default()
        };
        let config = ReleaseConfig::with_defaults(temp.path(), flags, temp.path().join("c"));
        fs::create_dir_all(config.release_dir.join("include/R_ext")).unwrap();
        fs::write(config.release_dir.join("include/Rinternals.h"), "/* */").unwrap();
        config
    }

    fn release_jar(config: &ReleaseConfig) -> DistributionDescriptor {
        build_distribution_descriptors(&config.flags)
            .find(RELEASE_JAR_BASE)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_passive_hooks_do_nothing() {
        let mut participant = PassiveParticipant;
        participant.opened(Path::new("/tmp/x.jar")).unwrap();
        assert!(!participant.add("bin/R", b"").unwrap());
        assert!(!participant.add_source("bin/R", b"").unwrap());
        participant.closing().unwrap();
    }

    #[test]
    fn test_cleanup_removes_include_dir() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, true);
        let descriptor = release_jar(&config);

        let mut participant = participant_for(&descriptor, &config);
        assert!(!participant.add("include/Rinternals.h", b"/* */").unwrap());
        participant.closing().unwrap();

        assert!(!config.release_dir.join("include").exists());
    }

    #[test]
    fn test_cleanup_skipped_without_flag() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, false);
        let descriptor = release_jar(&config);

        participant_for(&descriptor, &config).closing().unwrap();

        assert!(config.release_dir.join("include").exists());
    }

    #[test]
    fn test_cleanup_rejects_unexpected_dependency() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, true);
        let mut descriptor = release_jar(&config);
        descriptor.dependencies = vec!["com.oracle.truffle.r.native".into()];

        let err = participant_for(&descriptor, &config).closing().unwrap_err();
        assert!(err.to_string().contains("release project"));
        assert!(config.release_dir.join("include").exists());
    }

    #[test]
    fn test_other_jars_get_passive_participant() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp, true);
        let descriptor = DistributionDescriptor {
            name: "FASTR_UNIT_TESTS".into(),
            description: None,
            path: None,
            dependencies: vec![],
            platform_dependent: false,
            kind: DistributionKind::Jar,
        };

        participant_for(&descriptor, &config).closing().unwrap();

        assert!(config.release_dir.join("include").exists());
    }
}
