//! Wire protocol between rpkg and the R session process.
//!
//! Requests are single lines of R code written to the process's stdin:
//!
//! ```text
//! .rpkg_eval("<escaped expression>")
//! ```
//!
//! Responses are framed on stdout by marker lines carrying the session token,
//! with a single JSON payload line in between:
//!
//! ```text
//! <<<rpkg:TOKEN:begin>>>
//! {"type":"strings","values":["a","b"]}
//! <<<rpkg:TOKEN:end>>>
//! ```
//!
//! Anything R prints outside a frame is passed to the `on_output` callback.

use std::io::{BufRead, Write};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::rexpr::r_string;
use crate::value::{EvalOutcome, Field, RValue};

/// Largest payload accepted from the R process (100MB).
const MAX_PAYLOAD: usize = 100 * 1024 * 1024;

/// Marker lines delimiting one response.
#[derive(Debug, Clone)]
pub struct Frame {
    begin: String,
    end: String,
}

impl Frame {
    /// Markers for the session identified by `token`.
    pub fn new(token: &str) -> Self {
        Self {
            begin: format!("<<<rpkg:{}:begin>>>", token),
            end: format!("<<<rpkg:{}:end>>>", token),
        }
    }
}

/// Payload as emitted by the driver's encoder.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireValue {
    Null,
    Absent {
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        message: String,
    },
    String {
        value: Option<String>,
    },
    Strings {
        values: Vec<Option<String>>,
    },
    Logical {
        values: Vec<Option<bool>>,
    },
    Numeric {
        values: Vec<Option<f64>>,
    },
    Record {
        fields: Vec<WireField>,
    },
    Other {
        class: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct WireField {
    name: String,
    values: Vec<Option<String>>,
}

impl From<WireValue> for EvalOutcome {
    fn from(wire: WireValue) -> Self {
        let value = match wire {
            WireValue::Absent { reason } => {
                if let Some(reason) = reason {
                    tracing::debug!("R returned no value: {}", reason);
                }
                return EvalOutcome::Absent;
            }
            WireValue::Error { message } => return EvalOutcome::TrappedError(message),
            WireValue::Null => RValue::Null,
            WireValue::String { value } => RValue::Str(na_string(value)),
            WireValue::Strings { values } => {
                RValue::Strings(values.into_iter().map(na_string).collect())
            }
            WireValue::Logical { values } => RValue::Logical(values),
            WireValue::Numeric { values } => RValue::Numeric(values),
            WireValue::Record { fields } => RValue::Record(
                fields
                    .into_iter()
                    .map(|f| Field {
                        name: f.name,
                        values: f.values.into_iter().map(na_string).collect(),
                    })
                    .collect(),
            ),
            WireValue::Other { class } => RValue::Other(class),
        };
        EvalOutcome::Value(value)
    }
}

fn na_string(value: Option<String>) -> String {
    value.unwrap_or_else(|| "NA".to_string())
}

/// Write one evaluation request.
pub fn write_request<W: Write>(writer: &mut W, expression: &str) -> Result<()> {
    writeln!(writer, ".rpkg_eval({})", r_string(expression))
        .map_err(|e| Error::Ipc(format!("Failed to write request to R: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush R stdin: {}", e)))?;
    Ok(())
}

/// Read the next framed response, forwarding unframed output.
pub fn read_response<R: BufRead>(
    reader: &mut R,
    frame: &Frame,
    mut on_output: impl FnMut(&str),
) -> Result<EvalOutcome> {
    let mut line = String::new();

    loop {
        if !read_line(reader, &mut line)? {
            return Err(Error::Ipc("R process terminated unexpectedly".to_string()));
        }
        if line == frame.begin {
            break;
        }
        if !line.is_empty() {
            on_output(&line);
        }
    }

    let mut payload = String::new();
    loop {
        if !read_line(reader, &mut line)? {
            return Err(Error::Ipc(
                "R process terminated in the middle of a response".to_string(),
            ));
        }
        if line == frame.end {
            break;
        }
        payload.push_str(&line);
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::Ipc(format!(
                "R response too large: more than {} bytes",
                MAX_PAYLOAD
            )));
        }
    }

    let wire: WireValue = serde_json::from_str(&payload)?;
    Ok(wire.into())
}

/// Read one line without its terminator; `false` at end of stream.
fn read_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<bool> {
    line.clear();
    let n = reader
        .read_line(line)
        .map_err(|e| Error::Ipc(format!("Failed to read from R: {}", e)))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(n > 0)
}
