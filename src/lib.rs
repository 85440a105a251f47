//! Release assembly and packaging for FastR.
//!
//! This crate turns a built FastR suite into a relocatable release bundle
//! and declares the distributions that ship it:
//!
//! - **Release build** - mirror the runtime tree, rebuild `lib/`, write the
//!   bundle metadata and materialize the launchers ([`build`])
//! - **Registration** - the jar, tar and GraalVM support descriptors for
//!   the current flags ([`distribution`])
//! - **Packaging** - jar and tar writers plus the archive participant that
//!   cleans the release project after the release jar is written
//!   ([`artifact`])
//!
//! # Architecture
//!
//! ```text
//! fastr-release (binary)
//!     │
//!     ├── config::ReleaseConfig   env flags + fastr-release.toml
//!     ├── classpath               jar locations from the host build tool
//!     │
//!     ├── build::ReleaseBuildTask ──> com.oracle.truffle.r.release/
//!     │
//!     └── distribution ──> artifact::Packager ──> mxbuild/dists/<os>/<arch>/
//! ```
//!
//! Nothing runs unless `FASTR_RELEASE` is set; without it the build is a
//! logged no-op and the release project contributes no results.

pub mod artifact;
pub mod build;
pub mod classpath;
pub mod config;
pub mod distribution;
pub mod logging;

pub use artifact::{release_results, ArchiveParticipant, PackagedArchive, Packager};
pub use build::{BuildOutcome, ReleaseBuildTask, ReleaseSummary};
pub use classpath::{ClasspathEntry, ClasspathSource, ManifestClasspath};
pub use config::{ReleaseConfig, ReleaseFlags};
pub use distribution::{build_distribution_descriptors, DistributionDescriptor, Registration};
