//! R interpreter running in a child process.
//!
//! The process is started once per session with `--vanilla --no-echo`, fed the
//! driver script, and then kept alive for the lifetime of the session. Its
//! stderr is drained by a background thread into the log.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use crate::bootstrap::{self, BridgeHandle};
use crate::error::{Error, Result};
use crate::value::{EvalOutcome, RValue};

use super::interpreter::{Interpreter, InterpreterLauncher};
use super::protocol::{Frame, read_response, write_request};

const DRIVER: &str = include_str!("driver.R");

/// Handle to a running R process.
pub struct RProcess {
    /// The child process.
    child: Child,
    /// Buffered stdin writer.
    stdin: BufWriter<ChildStdin>,
    /// Buffered stdout reader.
    stdout: BufReader<ChildStdout>,
    /// Response markers for this process.
    frame: Frame,
    /// Whether the process has been killed.
    killed: bool,
}

impl RProcess {
    /// Start R from a prepared environment and verify it answers.
    pub fn spawn(bridge: &BridgeHandle) -> Result<Self> {
        let executable = bridge.r_executable();
        tracing::debug!("Spawning {}", executable.display());

        let mut child = Command::new(&executable)
            .args(["--vanilla", "--no-echo"])
            .env(bootstrap::R_HOME_VAR, &bridge.r_home)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to start R process '{}': {}",
                    executable.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get R stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get R stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            thread::Builder::new()
                .name("r-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                        tracing::info!(target: "rpkg::r", "{}", line);
                    }
                })?;
        }

        let token = Uuid::new_v4().simple().to_string();
        let mut process = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            frame: Frame::new(&token),
            killed: false,
        };

        process.load_driver(&token)?;
        Ok(process)
    }

    /// Send the driver script and wait for its first answer.
    fn load_driver(&mut self, token: &str) -> Result<()> {
        writeln!(self.stdin, ".rpkg_token <- \"{}\"", token)
            .and_then(|_| self.stdin.write_all(DRIVER.as_bytes()))
            .and_then(|_| self.stdin.write_all(b"\n"))
            .map_err(|e| Error::Ipc(format!("Failed to send driver to R: {}", e)))?;

        match self.eval("'pong'")? {
            EvalOutcome::Value(RValue::Str(reply)) if reply == "pong" => Ok(()),
            other => Err(Error::Ipc(format!(
                "Unexpected response from R during start-up: {:?}",
                other
            ))),
        }
    }

    /// Get the process ID of the interpreter.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Stop the interpreter.
    pub fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;

        // Ask R to quit first so it can clean up its temp directory
        let _ = writeln!(self.stdin, "quit(save = \"no\")").and_then(|_| self.stdin.flush());
        thread::sleep(Duration::from_millis(50));

        if let Ok(None) = self.child.try_wait()
            && let Err(e) = self.child.kill()
        {
            tracing::warn!("Failed to kill R process: {}", e);
        }
        let _ = self.child.wait();
    }
}

impl Interpreter for RProcess {
    fn eval(&mut self, expression: &str) -> Result<EvalOutcome> {
        if self.killed {
            return Err(Error::Ipc("R process has been stopped".to_string()));
        }
        write_request(&mut self.stdin, expression)?;
        read_response(&mut self.stdout, &self.frame, |line| {
            tracing::debug!(target: "rpkg::r", "{}", line);
        })
    }

    fn is_alive(&mut self) -> bool {
        !self.killed && matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for RProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Launches [`RProcess`] interpreters after bootstrapping the environment.
#[derive(Debug, Clone, Default)]
pub struct RLauncher {
    /// R installation directory.
    pub r_home: Option<PathBuf>,
    /// Extra directories holding shared libraries needed by R packages.
    pub shared_libs: Vec<PathBuf>,
}

impl RLauncher {
    /// Create a launcher for the given R home.
    pub fn new(r_home: Option<PathBuf>, shared_libs: Vec<PathBuf>) -> Self {
        Self {
            r_home,
            shared_libs,
        }
    }
}

impl InterpreterLauncher for RLauncher {
    fn launch(&self) -> Result<Box<dyn Interpreter>> {
        let bridge = bootstrap::ensure_ready(self.r_home.as_deref(), &self.shared_libs)?;
        let process = RProcess::spawn(&bridge)?;
        tracing::debug!("R process started with pid {}", process.pid());
        Ok(Box::new(process))
    }
}
