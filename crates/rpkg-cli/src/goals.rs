//! Goal execution for the rpkg CLI.
//!
//! Every invocation builds one session manager, so goals run together share
//! a single R process.

use std::path::Path;
use std::time::Instant;

use rpkg_core::stages;
use rpkg_core::{FilteringCopier, Goal, ManifestRegistry, Project, SessionManager, StageContext};

use crate::colors;
use crate::settings::{self, RuntimeOptions};

/// Run `goals` against the project in `project_dir`.
pub fn execute(project_dir: &Path, options: &RuntimeOptions, goals: &[Goal]) -> anyhow::Result<()> {
    let start = Instant::now();
    let project = Project::from_dir(project_dir)?;
    let launcher = settings::resolve_launcher(options, &project.r)?;
    let sessions = SessionManager::new(launcher);
    let registry = ManifestRegistry::in_build_dir(&project.build_dir);

    let ctx = StageContext {
        project: &project,
        sessions: &sessions,
        copier: &FilteringCopier,
        registry: &registry,
    };

    let planned = stages::plan(goals);
    for goal in &planned {
        println!(
            "\n{}{}{} {}({}){}",
            colors::BOLD,
            goal,
            colors::RESET,
            colors::DIM,
            goal.phase(),
            colors::RESET
        );
        goal.execute(&ctx)?;
    }

    println!(
        "\n{}Completed{} {} goal(s) for {} in {:.2}s",
        colors::GREEN,
        colors::RESET,
        planned.len(),
        project.package.name,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Print every goal with its default phase, in lifecycle order.
pub fn print_phases() {
    for goal in Goal::ALL {
        println!(
            "{}{:<10}{} {}",
            colors::CYAN,
            goal.name(),
            colors::RESET,
            goal.phase()
        );
    }
}
