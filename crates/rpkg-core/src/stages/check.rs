use crate::diagnostics::parse_check_result;
use crate::error::Result;
use crate::project::CheckTarget;
use crate::rexpr;

use super::{Goal, StageContext, StageReport, StageRun, StageState};

/// Run `R CMD check` and report its verdict.
///
/// With the default target the archive from the build goal must already
/// exist in the build directory.
pub fn check(ctx: &StageContext<'_>) -> Result<StageReport> {
    tracing::info!("Check started");

    StageRun::new(Goal::Check).finish(|run| {
        let (version, session) = run.prepare(ctx)?;
        let project = ctx.project;
        let config = &project.goals.check;
        let extra = config.args.as_deref();

        let statement = match config.target {
            CheckTarget::Built => {
                rexpr::check_built(&project.archive_path(&version), &project.build_dir, extra)
            }
            CheckTarget::Source => {
                rexpr::check_source(&project.output_dir, &project.build_dir, extra)
            }
        };
        let outcome = session.evaluate(&statement)?;
        run.advance(StageState::VerbEvaluated);

        let verdict = parse_check_result(outcome, config.null_result)?;
        tracing::info!("Check completed.");
        verdict.report();
        run.advance(StageState::Parsed);

        verdict.into_result().map(drop)
    })
}
