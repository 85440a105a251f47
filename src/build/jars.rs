//! Stage 5: copy the runtime jars and render the Java launchers.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::filesystem::remove_dir_if_exists;
use super::template::LauncherTemplate;
use crate::classpath::{ClasspathEntry, ClasspathSource};
use crate::config::ReleaseConfig;

/// Distribution whose classpath the launchers load.
pub const RUNTIME_DISTRIBUTION: &str = "FASTR";

/// Jars directory relative to the release root.
pub const JARS_DIR: &str = "bin/fastr_jars";

/// How the launchers reach the jars directory at run time.
pub const RUNTIME_JARS_PREFIX: &str = "$R_HOME/bin/fastr_jars";

/// Template key carrying the classpath.
pub const CLASSPATH_KEY: &str = "CLASSPATH";

/// Launcher templates (release-relative) and where they are rendered.
pub const LAUNCHERS: &[(&str, &str)] = &[
    ("src/R_legacy", "bin/exec/R"),
    ("src/Rscript_legacy", "bin/Rscript"),
];

/// Directory of the mx exec scripts the rendered launchers supersede.
pub const LEGACY_EXEC_DIR: &str = "bin/execRextras";

/// Copy each classpath entry into `jars_dir`, returning the written names.
pub fn copy_classpath_jars(entries: &[ClasspathEntry], jars_dir: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(jars_dir)
        .with_context(|| format!("creating jars directory '{}'", jars_dir.display()))?;

    let mut written = Vec::with_capacity(entries.len());
    for entry in entries {
        if !entry.path.is_file() {
            bail!(
                "classpath entry '{}' does not resolve to a regular file: {}",
                entry.name,
                entry.path.display()
            );
        }
        let file_name = entry.jar_file_name()?;
        let target = jars_dir.join(&file_name);
        fs::copy(&entry.path, &target).with_context(|| {
            format!(
                "copying classpath entry '{}' -> '{}'",
                entry.path.display(),
                target.display()
            )
        })?;
        written.push(file_name);
    }
    Ok(written)
}

/// Files below `jars_dir`, as sorted `/`-separated paths relative to it.
///
/// Jars in subdirectories keep their subdirectory, so the classpath built
/// from this list points at files that exist.
pub fn list_jars(jars_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(jars_dir).min_depth(1) {
        let entry =
            entry.with_context(|| format!("reading jars directory '{}'", jars_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(jars_dir)?;
        if let Some(name) = rel.to_str() {
            names.push(name.replace('\\', "/"));
        }
    }
    names.sort();
    Ok(names)
}

/// `$R_HOME/bin/fastr_jars/<jar>` entries joined with `:`.
pub fn runtime_classpath<S: AsRef<str>>(jars: &[S]) -> String {
    jars.iter()
        .map(|jar| format!("{RUNTIME_JARS_PREFIX}/{}", jar.as_ref()))
        .collect::<Vec<_>>()
        .join(":")
}

/// What stage 5 produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaLaunchers {
    pub jars: Vec<String>,
    pub classpath: String,
}

/// Copy the runtime jars, compute the classpath and render both launchers.
pub fn materialize_java_launchers(
    config: &ReleaseConfig,
    classpath: &dyn ClasspathSource,
) -> Result<JavaLaunchers> {
    let entries = classpath
        .entries(RUNTIME_DISTRIBUTION)
        .with_context(|| format!("resolving classpath of '{RUNTIME_DISTRIBUTION}'"))?;

    let jars_dir = config.release_dir.join(JARS_DIR);
    let copied = copy_classpath_jars(&entries, &jars_dir)?;
    debug!(copied = copied.len(), dir = %jars_dir.display(), "copied runtime jars");

    let jars = list_jars(&jars_dir)?;
    let classpath_string = runtime_classpath(jars.as_slice());

    let values: BTreeMap<&str, &str> = [(CLASSPATH_KEY, classpath_string.as_str())]
        .into_iter()
        .collect();
    for (template, target) in LAUNCHERS {
        let template_path = config.release_dir.join(template);
        let target_path = config.release_dir.join(target);
        LauncherTemplate::load(&template_path)?
            .render_to(&target_path, &values)
            .with_context(|| format!("rendering launcher '{}'", target_path.display()))?;
    }

    let legacy = config.release_dir.join(LEGACY_EXEC_DIR);
    if !remove_dir_if_exists(&legacy)? {
        debug!(dir = %legacy.display(), "no legacy exec scripts to remove");
    }

    Ok(JavaLaunchers {
        jars,
        classpath: classpath_string,
    })
}
