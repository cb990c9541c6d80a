//! rpkg CLI - build, check and document R packages.

mod colors;
mod goals;
mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rpkg_core::Goal;

use crate::settings::RuntimeOptions;

#[derive(Parser)]
#[command(name = "rpkg")]
#[command(about = "Build, check and document R packages through an embedded R session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory containing rpkg.toml
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// R installation directory (defaults to R_HOME)
    #[arg(long, global = true)]
    r_home: Option<PathBuf>,

    /// Extra directory with shared libraries needed by R packages
    #[arg(long = "shared-lib", global = true)]
    shared_libs: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the R sources to the output directory and patch DESCRIPTION
    Sources,

    /// Generate documentation with roxygen
    Document,

    /// Validate the prepared DESCRIPTION file
    Validate,

    /// Run R CMD check
    Check,

    /// Run R CMD build and attach the archive
    Build,

    /// Run several goals in lifecycle order with one R session
    Run {
        /// Goals to run (sources, document, validate, check, build)
        #[arg(required = true)]
        goals: Vec<Goal>,
    },

    /// List goals and the phase each is bound to
    Phases,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Helper to format rpkg-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(rpkg_err) = err.downcast_ref::<rpkg_core::Error>() {
            anyhow::anyhow!("{}", rpkg_err.with_hint())
        } else {
            err
        }
    };

    let options = RuntimeOptions {
        r_home: cli.r_home,
        shared_libs: cli.shared_libs,
    };

    let goals = match cli.command {
        Commands::Sources => vec![Goal::Sources],
        Commands::Document => vec![Goal::Document],
        Commands::Validate => vec![Goal::Validate],
        Commands::Check => vec![Goal::Check],
        Commands::Build => vec![Goal::Build],
        Commands::Run { goals } => goals,
        Commands::Phases => {
            goals::print_phases();
            return Ok(());
        }
    };

    goals::execute(&cli.project, &options, &goals).map_err(format_error)?;
    Ok(())
}
