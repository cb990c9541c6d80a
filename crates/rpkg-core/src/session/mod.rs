//! The embedded R session.
//!
//! A [`SessionManager`] is created once per process and passed by reference to
//! every stage. It starts the interpreter lazily on first use and hands out the
//! same [`Session`] afterwards.
//!
//! # Locking
//!
//! ```text
//! SessionManager
//!     │
//!     ├── creation lock ── held while bootstrapping, so one thread starts R
//!     │
//!     └── Arc<Session>
//!             │
//!             └── call lock ── held for every evaluation, R is not reentrant
//! ```
//!
//! The two locks are independent: a stage holding the session can evaluate
//! while another thread waits on the creation lock, and vice versa.

mod interpreter;
pub mod protocol;
mod process;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::rexpr::{self, DEVTOOLS};
use crate::value::{EvalOutcome, RValue};

pub use interpreter::{Interpreter, InterpreterLauncher};
pub use process::{RLauncher, RProcess};

/// One running interpreter.
pub struct Session {
    /// Serializes every evaluation.
    call_lock: Mutex<Box<dyn Interpreter>>,
}

impl Session {
    /// Wrap a started interpreter.
    pub fn new(interpreter: Box<dyn Interpreter>) -> Self {
        Self {
            call_lock: Mutex::new(interpreter),
        }
    }

    fn interpreter(&self) -> Result<MutexGuard<'_, Box<dyn Interpreter>>> {
        self.call_lock
            .lock()
            .map_err(|_| Error::Runtime("R session lock poisoned".to_string()))
    }

    /// Evaluate without error trapping.
    ///
    /// Only for statements that set state, such as the working directory; the
    /// outcome carries no error interpretation.
    pub fn eval(&self, expression: &str) -> Result<EvalOutcome> {
        tracing::debug!("Executing R statement: {}", expression);
        self.interpreter()?.eval(expression)
    }

    /// Evaluate with the error guard and return the raw outcome.
    pub fn evaluate(&self, expression: &str) -> Result<EvalOutcome> {
        tracing::debug!("Executing R statement: {}", expression);
        self.interpreter()?.eval(&rexpr::guard(expression))
    }

    /// Evaluate with the error guard.
    ///
    /// A trapped R error becomes [`Error::Runtime`]. `Ok(None)` means the
    /// interpreter returned nothing at all, which callers treat as an
    /// internal failure of the operation they attempted.
    pub fn try_catch(&self, expression: &str) -> Result<Option<RValue>> {
        self.evaluate(expression)?.into_guarded()
    }

    /// Whether the interpreter process is still running.
    pub fn is_alive(&self) -> bool {
        self.interpreter().map(|mut r| r.is_alive()).unwrap_or(false)
    }
}

/// Owner of the process-wide session.
pub struct SessionManager {
    launcher: Box<dyn InterpreterLauncher>,
    required_package: String,
    /// Creation lock; `Some` once a session has started successfully.
    session: Mutex<Option<Arc<Session>>>,
}

impl SessionManager {
    /// Create a manager that starts interpreters with `launcher`.
    pub fn new(launcher: impl InterpreterLauncher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            required_package: DEVTOOLS.to_string(),
            session: Mutex::new(None),
        }
    }

    /// Require a different package than devtools at start-up.
    pub fn with_required_package(mut self, package: impl Into<String>) -> Self {
        self.required_package = package.into();
        self
    }

    /// Get the session, starting it on first use.
    ///
    /// Concurrent callers serialize on the creation lock. A failed start
    /// leaves no session behind, so the next call tries again.
    pub fn session(&self) -> Result<Arc<Session>> {
        let mut slot = self
            .session
            .lock()
            .map_err(|_| Error::Runtime("R session creation lock poisoned".to_string()))?;

        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(self.start()?);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Whether a session has been started.
    pub fn is_started(&self) -> bool {
        self.session.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn start(&self) -> Result<Session> {
        tracing::info!("Starting R engine...");
        let session = Session::new(self.launcher.launch()?);

        tracing::info!("Querying available R packages...");
        let packages = session
            .eval(&rexpr::installed_packages())?
            .value()
            .and_then(|value| value.as_strings())
            .ok_or_else(|| {
                Error::Runtime("Cannot query R for installed packages.".to_string())
            })?;
        tracing::debug!("Available R packages: {:?}", packages);

        if !packages.iter().any(|p| *p == self.required_package) {
            return Err(Error::Config(format!(
                "Package {} is not installed in R.",
                self.required_package
            )));
        }
        tracing::debug!("Package '{}' found.", self.required_package);

        tracing::info!("Loading required packages...");
        if session
            .try_catch(&rexpr::library(&self.required_package))?
            .is_none()
        {
            return Err(Error::Runtime(
                "Unexpected error while loading R. Please check R runtime requirements and try again"
                    .to_string(),
            ));
        }

        Ok(session)
    }
}
