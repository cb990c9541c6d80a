use crate::error::{Error, Result};
use crate::rexpr;
use crate::value::RValue;

use super::{Goal, StageContext, StageReport, StageRun, StageState};

/// Check the prepared `DESCRIPTION` against the rules of `R CMD check`.
pub fn validate(ctx: &StageContext<'_>) -> Result<StageReport> {
    let project = ctx.project;
    if project.goals.validate.skip {
        return Ok(StageReport::skipped(Goal::Validate));
    }

    let report = StageRun::new(Goal::Validate).finish(|run| {
        let description = project.description_path();
        if !description.exists() {
            tracing::error!("DESCRIPTION file does not exists.");
            tracing::error!("Remember to use the 'sources' goal.");
            return Err(Error::Config("DESCRIPTION file does not exists.".to_string()));
        }
        run.advance(StageState::DirectoriesReady);

        let session = ctx.sessions.session()?;
        run.advance(StageState::SessionAcquired);

        let value = session
            .try_catch(&rexpr::check_description(&description))?
            .ok_or_else(|| {
                Error::Runtime("R internal error while validating DESCRIPTION".to_string())
            })?;
        run.advance(StageState::VerbEvaluated);

        let problems = problems(value)?;
        for problem in &problems {
            tracing::error!("{}", problem);
        }
        run.advance(StageState::Parsed);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Verdict("Project metadata contains errors.".to_string()))
        }
    })?;

    tracing::info!("Validation complete.");
    Ok(report)
}

/// One message per element of the validation result.
fn problems(value: RValue) -> Result<Vec<String>> {
    match value {
        RValue::Null => Ok(Vec::new()),
        RValue::Str(message) => Ok(vec![message]),
        RValue::Strings(messages) => Ok(messages),
        RValue::Record(fields) => Ok(fields
            .into_iter()
            .map(|field| match field.name.as_str() {
                "" => field.values.join("\n"),
                name => format!("{}: {}", name, field.values.join("\n")),
            })
            .collect()),
        other => Err(Error::Runtime(format!(
            "Unexpected DESCRIPTION check result: {}",
            other
        ))),
    }
}
