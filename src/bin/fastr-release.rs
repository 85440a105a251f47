//! `fastr-release` - assemble and package FastR release bundles.
//!
//! ## Commands
//!
//! - `build`: assemble the release project (needs `FASTR_RELEASE`)
//! - `results`: list the files the release project contributes
//! - `register`: print the registered distributions as JSON
//! - `package`: write the archives of the named distributions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use fastr_release::classpath::CachePaths;
use fastr_release::logging::init_tracing;
use fastr_release::{
    build_distribution_descriptors, release_results, BuildOutcome, ManifestClasspath, Packager,
    ReleaseBuildTask, ReleaseConfig,
};

#[derive(Parser)]
#[command(name = "fastr-release")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Assemble and package FastR release bundles", long_about = None)]
struct Cli {
    /// FastR suite directory (default: current directory)
    #[arg(long, global = true)]
    suite_dir: Option<PathBuf>,

    /// Release config file (default: <suite>/fastr-release.toml, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the release project from the built suite
    Build,

    /// List the files the release project contributes to its distributions
    Results,

    /// Print the registered distributions and component as JSON
    Register,

    /// Write the archives of the named distributions
    Package {
        /// Distribution names, e.g. FASTR_RELEASE
        #[arg(required = true)]
        distributions: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.log_level);

    if let Err(err) = run(cli) {
        eprintln!("[fastr-release] error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let suite_dir = match cli.suite_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let config = ReleaseConfig::load(&suite_dir, cli.config.as_deref())
        .with_context(|| format!("loading release config for '{}'", suite_dir.display()))?;

    match cli.command {
        Commands::Build => build(&config),
        Commands::Results => {
            for path in release_results(&config)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Register => {
            let registration = build_distribution_descriptors(&config.flags);
            let json = serde_json::to_string_pretty(&registration)
                .context("serializing distribution descriptors")?;
            println!("{json}");
            Ok(())
        }
        Commands::Package { distributions } => {
            let registration = build_distribution_descriptors(&config.flags);
            let packager = Packager::new(&config, &registration);
            for name in &distributions {
                let packaged = packager
                    .package(name)
                    .with_context(|| format!("packaging '{name}'"))?;
                println!(
                    "[fastr-release:{name}] {} ({} entries, sha256 {})",
                    packaged.path.display(),
                    packaged.entries,
                    packaged.sha256
                );
            }
            Ok(())
        }
    }
}

fn build(config: &ReleaseConfig) -> Result<()> {
    let classpath = ManifestClasspath::new(
        config.classpath_manifest.clone(),
        CachePaths::new(config.cache_dir.clone()),
    );
    match ReleaseBuildTask::new(config, &classpath).build()? {
        BuildOutcome::Skipped => {}
        BuildOutcome::Assembled(summary) => {
            println!(
                "[fastr-release] release assembled at {} ({} files mirrored, {} jars)",
                summary.release_dir.display(),
                summary.mirrored_files,
                summary.launchers.jars.len()
            );
        }
    }
    Ok(())
}
