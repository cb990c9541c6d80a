//! Error types for rpkg-core.

use thiserror::Error;

/// Result type for rpkg-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// Every error terminates the stage that produced it; the kind only tells the
/// caller whether the fault lies in the setup, in the interpreter, or in the
/// package being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid or missing setup (R home, bridge library, devtools, version).
    Config,
    /// The interpreter failed or returned something unusable.
    Runtime,
    /// The package itself was found faulty (check errors, invalid metadata).
    Verdict,
}

/// Errors that can occur in rpkg-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or missing prerequisite.
    #[error("{0}")]
    Config(String),

    /// Interpreter-level failure.
    #[error("{0}")]
    Runtime(String),

    /// The package failed a check or a metadata validation.
    #[error("{0}")]
    Verdict(String),

    /// Failed to load the bridge library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// Malformed response payload from the R process.
    #[error("protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Malformed project descriptor or settings file.
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Communication failure with the R process.
    #[error("IPC error: {0}")]
    Ipc(String),
}

impl Error {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::Toml(_) => ErrorKind::Config,
            Error::Verdict(_) => ErrorKind::Verdict,
            Error::Runtime(_)
            | Error::LibraryLoad(_)
            | Error::Protocol(_)
            | Error::Io(_)
            | Error::Ipc(_) => ErrorKind::Runtime,
        }
    }

    /// Recovery hint for errors with a well-known remedy.
    pub fn hint(&self) -> Option<&'static str> {
        let Error::Config(message) = self else {
            return match self {
                Error::Ipc(_) => Some("the R process died; rerun with --verbose to see its output"),
                _ => None,
            };
        };

        if message.contains("R_HOME") {
            Some("set R_HOME, pass --r-home, or put `R` on PATH")
        } else if message.contains("devtools") {
            Some("run install.packages(\"devtools\") in R")
        } else if message.contains("DESCRIPTION file does not exist") {
            Some("run the 'sources' goal first")
        } else if message.contains("rpkg.toml") {
            Some("pass --project or run from the project directory")
        } else if message.contains("does not match regular expression") {
            Some("use a version such as 1.2.3 or 1.2-3 in rpkg.toml")
        } else {
            None
        }
    }

    /// Render the error followed by its hint, if any.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(Error::Runtime("x".into()).kind(), ErrorKind::Runtime);
        assert_eq!(Error::Ipc("x".into()).kind(), ErrorKind::Runtime);
        assert_eq!(Error::Verdict("x".into()).kind(), ErrorKind::Verdict);
    }

    #[test]
    fn test_with_hint() {
        let err = Error::Config("Package devtools is not installed in R.".into());
        let rendered = err.with_hint();
        assert!(rendered.starts_with("Package devtools is not installed in R."));
        assert!(rendered.contains("install.packages"));

        let err = Error::Runtime("boom".into());
        assert_eq!(err.with_hint(), "boom");
    }
}
