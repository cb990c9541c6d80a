use crate::error::{Error, Result};
use crate::rexpr;

use super::{Goal, StageContext, StageReport, StageRun, StageState};

/// Generate documentation with roxygen.
pub fn document(ctx: &StageContext<'_>) -> Result<StageReport> {
    tracing::info!("ROxygenize started.");

    let report = StageRun::new(Goal::Document).finish(|run| {
        let (_, session) = run.prepare(ctx)?;
        let roclets = rexpr::roclets(ctx.project.goals.document.roclets.as_deref());

        session
            .try_catch(&rexpr::document(&ctx.project.output_dir, roclets.as_deref()))?
            .ok_or_else(|| {
                Error::Runtime("R internal error while invoking roxygen".to_string())
            })?;
        run.advance(StageState::VerbEvaluated);
        run.advance(StageState::Parsed);
        Ok(())
    })?;

    tracing::info!("ROxygenize completed.");
    Ok(report)
}
