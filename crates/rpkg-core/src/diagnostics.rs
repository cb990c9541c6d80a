//! Interpretation of `R CMD check` results.
//!
//! A check evaluation can come back in several shapes: a structured record
//! with `errors`, `warnings` and `notes`, a character vector of failure
//! messages, `NULL`, or nothing at all. [`parse_check_result`]
//! folds all of them into a [`CheckVerdict`] or an error.

use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::value::{EvalOutcome, RValue};

/// Prefix for every reported check line.
const LINE_PREFIX: &str = "        ";

/// How a `NULL` check result is treated.
///
/// The check result of a run that produced nothing is ambiguous: it may be a
/// clean pass or an undetected failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullResult {
    /// Report completion with nothing to show.
    #[default]
    Pass,
    /// Reject the result as unparseable.
    Fail,
}

/// Category of a check message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// Errors, warnings and notes of one check run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckVerdict {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

impl CheckVerdict {
    /// Whether the check failed; only errors fail it.
    pub fn is_failing(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Every message split into lines, in reporting order.
    pub fn lines(&self) -> Vec<(Severity, String)> {
        let mut lines = Vec::new();
        for (severity, messages) in [
            (Severity::Error, &self.errors),
            (Severity::Warning, &self.warnings),
            (Severity::Note, &self.notes),
        ] {
            for message in messages {
                lines.extend(split_lines(message).map(|line| (severity, line.to_string())));
            }
        }
        lines
    }

    /// Log every line at the level of its category.
    pub fn report(&self) {
        for (severity, line) in self.lines() {
            match severity {
                Severity::Error => tracing::error!("{}{}", LINE_PREFIX, line),
                Severity::Warning => tracing::warn!("{}{}", LINE_PREFIX, line),
                Severity::Note => tracing::info!("{}{}", LINE_PREFIX, line),
            }
        }
    }

    /// Convert a failing verdict into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_failing() {
            Err(Error::Verdict(
                "Checking R package resulted in errors.".to_string(),
            ))
        } else {
            Ok(self)
        }
    }
}

/// Split a message on `\r\n` or `\n`.
pub fn split_lines(message: &str) -> impl Iterator<Item = &str> {
    message
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Interpret the outcome of a check evaluation.
///
/// A trapped error must already have been turned into an error by the guard;
/// it is rejected here too so the function is total over [`EvalOutcome`].
pub fn parse_check_result(outcome: EvalOutcome, null_result: NullResult) -> Result<CheckVerdict> {
    let value = match outcome {
        EvalOutcome::Absent => {
            return Err(internal_error());
        }
        EvalOutcome::TrappedError(message) => {
            return Err(Error::Runtime(format!("R engine threw an error: {}", message)));
        }
        EvalOutcome::Value(value) => value,
    };

    match value {
        RValue::Strings(messages) => {
            for message in &messages {
                tracing::error!("{}", message);
            }
            Err(internal_error())
        }
        // A one-element character vector arrives as a scalar string
        RValue::Str(message) => {
            tracing::error!("{}", message);
            Err(internal_error())
        }
        RValue::Null => match null_result {
            NullResult::Pass => Ok(CheckVerdict::default()),
            NullResult::Fail => Err(Error::Runtime(
                "R CMD check returned no result".to_string(),
            )),
        },
        record @ RValue::Record(_) => {
            let field = |name: &str| {
                record.field(name).map(<[String]>::to_vec).ok_or_else(|| {
                    Error::Runtime(format!("R CMD check result has no '{}' field", name))
                })
            };
            Ok(CheckVerdict {
                errors: field("errors")?,
                warnings: field("warnings")?,
                notes: field("notes")?,
            })
        }
        other => Err(Error::Runtime(format!(
            "Unexpected R CMD check result: {}",
            other
        ))),
    }
}

fn internal_error() -> Error {
    Error::Runtime("R internal error while invoking R CMD check".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Field;

    fn record(errors: &[&str], warnings: &[&str], notes: &[&str]) -> EvalOutcome {
        let field = |name: &str, values: &[&str]| Field {
            name: name.to_string(),
            values: values.iter().map(|s| s.to_string()).collect(),
        };
        EvalOutcome::Value(RValue::Record(vec![
            field("package", &["demo"]),
            field("errors", errors),
            field("warnings", warnings),
            field("notes", notes),
        ]))
    }

    #[test]
    fn test_warning_only_passes() {
        let verdict = parse_check_result(record(&[], &["w1"], &[]), NullResult::Pass).unwrap();
        assert!(!verdict.is_failing());
        assert_eq!(verdict.lines(), vec![(Severity::Warning, "w1".to_string())]);
        assert!(verdict.into_result().is_ok());
    }

    #[test]
    fn test_multiline_error_fails() {
        let verdict = parse_check_result(record(&["e1\ne2"], &[], &[]), NullResult::Pass).unwrap();
        assert!(verdict.is_failing());
        assert_eq!(
            verdict.lines(),
            vec![
                (Severity::Error, "e1".to_string()),
                (Severity::Error, "e2".to_string()),
            ]
        );
        let err = verdict.into_result().unwrap_err();
        assert!(matches!(err, Error::Verdict(_)));
    }

    #[test]
    fn test_crlf_lines() {
        let verdict =
            parse_check_result(record(&[], &[], &["n1\r\nn2\nn3"]), NullResult::Pass).unwrap();
        let notes: Vec<String> = verdict.lines().into_iter().map(|(_, l)| l).collect();
        assert_eq!(notes, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_string_list_is_failure() {
        let outcome = EvalOutcome::Value(RValue::Strings(vec!["bad thing".into()]));
        let err = parse_check_result(outcome, NullResult::Pass).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(err.to_string(), "R internal error while invoking R CMD check");
    }

    #[test]
    fn test_single_failure_message_is_internal_error() {
        let outcome = EvalOutcome::Value(RValue::Str("bad thing".into()));
        let err = parse_check_result(outcome, NullResult::Pass).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(err.to_string(), "R internal error while invoking R CMD check");
    }

    #[test]
    fn test_framed_single_failure_message() {
        use crate::session::protocol::{Frame, read_response};
        use std::io::Cursor;

        let frame = Frame::new("t");
        let input = "<<<rpkg:t:begin>>>\n{\"type\":\"string\",\"value\":\"bad thing\"}\n<<<rpkg:t:end>>>\n";
        let outcome = read_response(&mut Cursor::new(input), &frame, |_| {}).unwrap();
        assert_eq!(outcome, EvalOutcome::Value(RValue::Str("bad thing".into())));

        let err = parse_check_result(outcome, NullResult::Pass).unwrap_err();
        assert_eq!(err.to_string(), "R internal error while invoking R CMD check");
    }

    #[test]
    fn test_absent_is_runtime_error() {
        let err = parse_check_result(EvalOutcome::Absent, NullResult::Pass).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert!(err.to_string().contains("internal error"));
    }

    #[test]
    fn test_null_result_policy() {
        let pass = parse_check_result(EvalOutcome::Value(RValue::Null), NullResult::Pass).unwrap();
        assert_eq!(pass, CheckVerdict::default());

        let fail = parse_check_result(EvalOutcome::Value(RValue::Null), NullResult::Fail);
        assert!(matches!(fail, Err(Error::Runtime(_))));
    }

    #[test]
    fn test_record_missing_field() {
        let outcome = EvalOutcome::Value(RValue::Record(vec![Field {
            name: "errors".into(),
            values: vec![],
        }]));
        let err = parse_check_result(outcome, NullResult::Pass).unwrap_err();
        assert!(err.to_string().contains("'warnings'"));
    }

    #[test]
    fn test_unexpected_shape() {
        let outcome = EvalOutcome::Value(RValue::Numeric(vec![Some(1.0)]));
        assert!(matches!(
            parse_check_result(outcome, NullResult::Pass),
            Err(Error::Runtime(_))
        ));
    }
}
