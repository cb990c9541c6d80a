use crate::description::patch_description;
use crate::error::Result;
use crate::resources::CopyRequest;

use super::{Goal, StageContext, StageReport, StageRun, StageState};

const DEFAULT_ENCODING: &str = "UTF-8";

/// Copy the package sources to the output directory and patch `DESCRIPTION`.
pub fn sources(ctx: &StageContext<'_>) -> Result<StageReport> {
    let project = ctx.project;
    let config = &project.goals.sources;
    if config.skip {
        return Ok(StageReport::skipped(Goal::Sources));
    }

    tracing::info!("Copying R sources...");

    StageRun::new(Goal::Sources).finish(|run| {
        project.setup_directories()?;
        run.advance(StageState::DirectoriesReady);

        let encoding = match project.encoding.as_deref() {
            Some(encoding) if !encoding.is_empty() => encoding.to_string(),
            _ => {
                tracing::warn!(
                    "File encoding has not been set, using {}.",
                    DEFAULT_ENCODING
                );
                DEFAULT_ENCODING.to_string()
            }
        };

        let request = CopyRequest {
            source_dir: project.r_source_dir(),
            output_dir: project.output_dir.clone(),
            encoding,
            filters: project.combined_filters(),
            filtering: config.filter_sources,
            properties: project.filter_properties(),
            escape_string: config.escape_string.clone(),
            non_filtered_extensions: config.non_filtered_extensions.clone(),
        };
        ctx.copier.copy(&request)?;
        run.advance(StageState::VerbEvaluated);

        let description = project.description_path();
        if description.is_file() {
            patch_description(&description, &project.descriptor()?)?;
        }
        run.advance(StageState::Parsed);
        Ok(())
    })
}
