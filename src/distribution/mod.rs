//! Distribution registration.
//!
//! [`build_distribution_descriptors`] is a pure function from the release
//! flags to the packaging targets of the release project plus, for GraalVM
//! builds, the language component descriptor. The host build tool calls it
//! once and owns the result; the [`crate::artifact`] packager consumes the
//! same data to materialize archives.

pub mod layout;

use serde::{Deserialize, Serialize};

use crate::config::{ReleaseFlags, DEFAULT_RELEASE_PROJECT};
pub use layout::{LayoutEntry, LayoutSource};

/// Suite the descriptors belong to.
pub const SUITE_NAME: &str = "fastr";

pub const RELEASE_JAR_BASE: &str = "FASTR_RELEASE";
pub const GRAALVM_RELEASE_BASE: &str = "FASTR_GRAALVM_RELEASE";
pub const GRAALVM_SUPPORT_BASE: &str = "FASTR_GRAALVM_SUPPORT";

/// A packaging target declared to the host build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Archive path relative to the output directory, with `<os>` and
    /// `<arch>` placeholders. `None` lets the packager pick a default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub dependencies: Vec<String>,
    pub platform_dependent: bool,
    #[serde(flatten)]
    pub kind: DistributionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionKind {
    /// Zip-format bundle of the dependencies' results.
    Jar,
    /// Plain tar of the dependencies' results.
    NativeTar {
        /// Store paths relative to each dependency's directory.
        relpath: bool,
    },
    /// Tar assembled from layout rules.
    LayoutTar { layout: Vec<LayoutEntry> },
}

impl DistributionDescriptor {
    pub fn is_jar(&self) -> bool {
        matches!(self.kind, DistributionKind::Jar)
    }
}

/// GraalVM language component contributed by this suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageComponent {
    pub suite: String,
    pub name: String,
    pub short_name: String,
    pub license_files: Vec<String>,
    pub third_party_license_files: Vec<String>,
    pub dependencies: Vec<String>,
    pub truffle_jars: Vec<String>,
    pub support_distributions: Vec<String>,
    pub provided_executables: Vec<String>,
    pub include_in_polyglot: bool,
    pub post_install_msg: String,
}

/// Everything registered with the host build tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub distributions: Vec<DistributionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<LanguageComponent>,
}

impl Registration {
    pub fn find(&self, name: &str) -> Option<&DistributionDescriptor> {
        self.distributions.iter().find(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.distributions.iter().map(|d| d.name.as_str()).collect()
    }
}

/// Declare the release distributions for the given flags.
pub fn build_distribution_descriptors(flags: &ReleaseFlags) -> Registration {
    let rffi = flags.rffi.as_str();
    let release_name = format!("{RELEASE_JAR_BASE}{rffi}");
    let graalvm_release_name = format!("{GRAALVM_RELEASE_BASE}{rffi}");

    let release_path = if rffi.is_empty() {
        "mxbuild/dists/<os>/<arch>/fastr-release.jar".to_string()
    } else {
        format!("mxbuild/dists/<os>/<arch>/{rffi}/fastr-release.jar")
    };

    let mut distributions = vec![
        DistributionDescriptor {
            name: release_name,
            description: Some("a binary release of FastR".to_string()),
            path: Some(release_path),
            dependencies: vec![DEFAULT_RELEASE_PROJECT.to_string()],
            platform_dependent: true,
            kind: DistributionKind::Jar,
        },
        DistributionDescriptor {
            name: graalvm_release_name.clone(),
            description: None,
            path: None,
            dependencies: vec![DEFAULT_RELEASE_PROJECT.to_string()],
            platform_dependent: true,
            kind: DistributionKind::NativeTar { relpath: true },
        },
    ];

    if flags.graalvm {
        distributions.push(graalvm_support_descriptor(rffi, &graalvm_release_name));
    }

    let component = flags.registers_component().then(language_component);

    Registration {
        distributions,
        component,
    }
}

fn graalvm_support_descriptor(rffi: &str, graalvm_release: &str) -> DistributionDescriptor {
    let qualified_release = format!("{SUITE_NAME}:{graalvm_release}");
    let layout = vec![
        LayoutEntry::new(
            "./",
            vec![
                LayoutSource::extracted(
                    graalvm_release,
                    "*",
                    &[
                        "COPYRIGHT",
                        "LICENSE",
                        "README.md",
                        "bin/Rscript",
                        "bin/fastr_jars",
                        "bin/exec/R",
                    ],
                ),
                LayoutSource::extracted(
                    graalvm_release,
                    "bin/fastr_jars/*",
                    &[
                        "bin/fastr_jars/fastr.jar",
                        "bin/fastr_jars/truffle*",
                        "bin/fastr_jars/graal-sdk*",
                    ],
                ),
                LayoutSource::Dependency {
                    dependency: format!("{SUITE_NAME}:FASTR_LAUNCHER"),
                },
            ],
        ),
        shorthand("LICENSE_FASTR", "file:LICENSE"),
        shorthand("3rd_party_licenses_fastr.txt", "file:3rd_party_licenses.txt"),
        LayoutEntry::new(
            "README_FASTR",
            vec![LayoutSource::ExtractedFile {
                dependency: qualified_release,
                path: "README.md".to_string(),
            }],
        ),
        shorthand(
            "bin/Rscript",
            "file:com.oracle.truffle.r.release/src/Rscript_legacy",
        ),
        shorthand("bin/exec/R", "file:com.oracle.truffle.r.release/src/R_legacy"),
        shorthand(
            "native-image.properties",
            "file:mx.fastr/native-image.properties",
        ),
    ];

    DistributionDescriptor {
        name: format!("{GRAALVM_SUPPORT_BASE}{rffi}"),
        description: Some("FastR support distribution for the GraalVM".to_string()),
        path: None,
        dependencies: Vec::new(),
        platform_dependent: true,
        kind: DistributionKind::LayoutTar { layout },
    }
}

/// Layout entry with one source written in shorthand. Text without a known
/// source type prefix is taken as a plain suite-relative file.
fn shorthand(destination: &str, source: &str) -> LayoutEntry {
    let parsed = source.parse().unwrap_or_else(|_| LayoutSource::File {
        path: source.to_string(),
    });
    LayoutEntry::new(destination, vec![parsed])
}

fn language_component() -> LanguageComponent {
    LanguageComponent {
        suite: SUITE_NAME.to_string(),
        name: "FastR".to_string(),
        short_name: "R".to_string(),
        license_files: vec!["LICENSE_FASTR".to_string()],
        third_party_license_files: vec!["3rd_party_licenses_fastr.txt".to_string()],
        dependencies: vec![
            "Truffle".to_string(),
            "Sulong".to_string(),
            "LLVM.org toolchain".to_string(),
        ],
        truffle_jars: vec!["fastr:FASTR".to_string()],
        support_distributions: vec!["fastr:FASTR_GRAALVM_SUPPORT".to_string()],
        provided_executables: vec!["bin/Rscript".to_string(), "bin/R".to_string()],
        include_in_polyglot: false,
        post_install_msg: POST_INSTALL_MSG.to_string(),
    }
}

const POST_INSTALL_MSG: &str = concat!(
    "NOTES:\n---------------\n",
    "FastR needs a system-dependent configuration because it links with some system libraries. ",
    "A generic configuration that works out of the box on most Linux distributions with GCC and gfortran installed is provided by default. ",
    "If you are on another system (e.g., MacOS), wish to fine-tune the configuration to your system, or should you encounter any ",
    "issues when running FastR or during R packages installation, try running the following script that adjusts ",
    "the configuration to your system: \n",
    "    ${graalvm_languages_dir}/R/bin/configure_fastr\n\n",
    "The user specific library directory was not created automatically. ",
    "You can either create the directory manually or edit file ${graalvm_languages_dir}/R/etc/Renviron to change it to any desired location. ",
    "Without the user specific library directory, users will need write permission for the GraalVM home directory in order to install R packages. ",
    "\n\n",
    "The R component comes without native image by default. If you wish to build the native image, ",
    "which provides faster startup, but slightly slower peak performance, then run the following:\n",
    "    ${graalvm_languages_dir}/R/bin/install_r_native_image\n\n",
    "The native image is then used by default. Pass '--jvm' flag to the R or Rscript launcher to ",
    "use JVM instead of the native image. Note that the native image is not stable yet and is intended for evaluation ",
    "purposes and experiments. Some features may not work in the native image mode, most notably some Rcpp based packages. ",
    "The native image can be uninstalled using the installation script with 'uninstall' argument.\n\n",
    "See http://www.graalvm.org/docs/reference-manual/languages/r for more.",
);

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(release: Option<&str>, rffi: &str) -> ReleaseFlags {
        ReleaseFlags {
            release: release.is_some(),
            graalvm: release == Some("true"),
            rffi: rffi.to_string(),
        }
    }

    #[test]
    fn test_default_registration() {
        let reg = build_distribution_descriptors(&flags(None, ""));

        assert_eq!(reg.names(), vec!["FASTR_RELEASE", "FASTR_GRAALVM_RELEASE"]);
        assert!(reg.component.is_none());

        let jar = reg.find("FASTR_RELEASE").unwrap();
        assert!(jar.is_jar());
        assert_eq!(jar.dependencies, vec!["com.oracle.truffle.r.release"]);
        assert_eq!(
            jar.path.as_deref(),
            Some("mxbuild/dists/<os>/<arch>/fastr-release.jar")
        );
        assert_eq!(jar.description.as_deref(), Some("a binary release of FastR"));

        let tar = reg.find("FASTR_GRAALVM_RELEASE").unwrap();
        assert_eq!(tar.kind, DistributionKind::NativeTar { relpath: true });
        assert_eq!(tar.dependencies, jar.dependencies);
    }

    #[test]
    fn test_rffi_suffixes_names_and_path() {
        let reg = build_distribution_descriptors(&flags(Some("true"), "llvm"));

        assert_eq!(
            reg.names(),
            vec![
                "FASTR_RELEASEllvm",
                "FASTR_GRAALVM_RELEASEllvm",
                "FASTR_GRAALVM_SUPPORTllvm"
            ]
        );
        assert_eq!(
            reg.find("FASTR_RELEASEllvm").unwrap().path.as_deref(),
            Some("mxbuild/dists/<os>/<arch>/llvm/fastr-release.jar")
        );
        assert!(reg.component.is_none());
    }

    #[test]
    fn test_release_flag_other_than_true_has_no_support_layout() {
        let reg = build_distribution_descriptors(&flags(Some("1"), ""));
        assert_eq!(reg.distributions.len(), 2);
        assert!(reg.component.is_none());
    }

    #[test]
    fn test_graalvm_registration() {
        let reg = build_distribution_descriptors(&flags(Some("true"), ""));

        let support = reg.find("FASTR_GRAALVM_SUPPORT").unwrap();
        assert!(support.dependencies.is_empty());
        let DistributionKind::LayoutTar { layout } = &support.kind else {
            panic!("support distribution must be a layout tar");
        };
        let destinations: Vec<_> = layout.iter().map(|e| e.destination.as_str()).collect();
        assert_eq!(
            destinations,
            vec![
                "./",
                "LICENSE_FASTR",
                "3rd_party_licenses_fastr.txt",
                "README_FASTR",
                "bin/Rscript",
                "bin/exec/R",
                "native-image.properties"
            ]
        );
        assert_eq!(layout[0].sources.len(), 3);
        assert_eq!(
            layout[1].sources,
            vec![LayoutSource::File {
                path: "LICENSE".into()
            }]
        );

        let component = reg.component.unwrap();
        assert_eq!(component.name, "FastR");
        assert_eq!(component.short_name, "R");
        assert_eq!(component.provided_executables, vec!["bin/Rscript", "bin/R"]);
        assert!(!component.include_in_polyglot);
        assert!(component.post_install_msg.starts_with("NOTES:\n"));
        assert!(component
            .post_install_msg
            .contains("${graalvm_languages_dir}/R/bin/configure_fastr"));
    }

    #[test]
    fn test_registration_is_pure() {
        let f = flags(Some("true"), "");
        assert_eq!(
            build_distribution_descriptors(&f),
            build_distribution_descriptors(&f)
        );
    }

    #[test]
    fn test_registration_json_shape() {
        let reg = build_distribution_descriptors(&flags(Some("true"), ""));
        let json = serde_json::to_value(&reg).unwrap();

        assert_eq!(json["distributions"][0]["kind"], "jar");
        assert_eq!(json["distributions"][1]["kind"], "native_tar");
        assert_eq!(json["distributions"][1]["relpath"], true);
        assert_eq!(json["distributions"][2]["kind"], "layout_tar");
        assert_eq!(json["component"]["short_name"], "R");

        let back: Registration = serde_json::from_value(json).unwrap();
        assert_eq!(back, reg);
    }
}
