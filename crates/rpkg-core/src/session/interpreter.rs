//! Seams between the session manager and a concrete interpreter.

use crate::error::Result;
use crate::value::EvalOutcome;

/// A running, non-reentrant R interpreter.
///
/// Implementations evaluate `expression` verbatim; error trapping is added by
/// [`crate::session::Session`] before the text reaches the interpreter.
pub trait Interpreter: Send {
    /// Evaluate an expression and return its outcome.
    ///
    /// An `Err` means the transport to the interpreter failed, not that the
    /// expression raised an R error.
    fn eval(&mut self, expression: &str) -> Result<EvalOutcome>;

    /// Whether the interpreter can still accept requests.
    fn is_alive(&mut self) -> bool;
}

/// Starts interpreters on behalf of the session manager.
///
/// `launch` is called under the manager's creation lock and performs any
/// environment bootstrap needed before the interpreter can run.
pub trait InterpreterLauncher: Send + Sync {
    /// Bootstrap the environment and start a fresh interpreter.
    fn launch(&self) -> Result<Box<dyn Interpreter>>;
}
