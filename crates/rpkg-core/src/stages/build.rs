use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::rexpr;

use super::{Goal, StageContext, StageReport, StageRun, StageState};

/// Artifact type of the source archive.
const ARCHIVE_TYPE: &str = "tar.gz";

/// Run `R CMD build` and attach the archive it produces.
pub fn build(ctx: &StageContext<'_>) -> Result<StageReport> {
    tracing::info!("Build started");

    StageRun::new(Goal::Build).finish(|run| {
        let (_, session) = run.prepare(ctx)?;
        let project = ctx.project;

        let value = session
            .try_catch(&rexpr::build(&project.output_dir, &project.build_dir))?
            .ok_or_else(|| {
                Error::Runtime("R internal error while invoking R CMD build".to_string())
            })?;
        run.advance(StageState::VerbEvaluated);

        let config = &project.goals.build;
        let classifier = config.classifier.as_deref();
        if config.attach_artifact {
            let archive = value.as_str().map(PathBuf::from).ok_or_else(|| {
                Error::Runtime(format!("R CMD build did not return an archive path: {}", value))
            })?;
            match classifier {
                Some(classifier) => tracing::info!(
                    "Added artifact {} to project with classifier {}.",
                    archive.display(),
                    classifier
                ),
                None => tracing::info!("Added artifact {} to project.", archive.display()),
            }
            ctx.registry.attach(ARCHIVE_TYPE, classifier, &archive)?;
        } else if classifier.is_some() {
            tracing::warn!("Classifier specified with artifact attachment disabled.");
        }

        run.advance(StageState::Parsed);
        Ok(())
    })
}
