//! Scripted interpreter used by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rpkg_core::rexpr;
use rpkg_core::{EvalOutcome, Interpreter, InterpreterLauncher, RValue, Result};

pub type Responder = Arc<dyn Fn(&str) -> EvalOutcome + Send + Sync>;

/// Shared state between a test and the interpreters it launches.
#[derive(Clone)]
pub struct Script {
    pub launches: Arc<AtomicUsize>,
    pub packages: Arc<Mutex<Vec<String>>>,
    pub log: Arc<Mutex<Vec<String>>>,
    library: Arc<Mutex<EvalOutcome>>,
    responder: Arc<Mutex<Responder>>,
    launch_delay: Duration,
}

impl Script {
    pub fn new() -> Self {
        let responder: Responder = Arc::new(|_: &str| EvalOutcome::Value(RValue::Null));
        Self {
            launches: Arc::new(AtomicUsize::new(0)),
            packages: Arc::new(Mutex::new(vec![
                "base".to_string(),
                "stats".to_string(),
                "devtools".to_string(),
            ])),
            log: Arc::new(Mutex::new(Vec::new())),
            library: Arc::new(Mutex::new(EvalOutcome::Value(RValue::Strings(vec![
                "devtools".into(),
            ])))),
            responder: Arc::new(Mutex::new(responder)),
            launch_delay: Duration::ZERO,
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Answer every non start-up expression with `responder`.
    pub fn respond(&self, responder: impl Fn(&str) -> EvalOutcome + Send + Sync + 'static) {
        *self.responder.lock().unwrap() = Arc::new(responder);
    }

    /// Outcome of the guarded `library()` call at start-up.
    pub fn set_library_outcome(&self, outcome: EvalOutcome) {
        *self.library.lock().unwrap() = outcome;
    }

    /// An empty list makes the package query return nothing at all.
    pub fn set_packages(&self, packages: &[&str]) {
        *self.packages.lock().unwrap() = packages.iter().map(|p| p.to_string()).collect();
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Expressions received so far, excluding start-up queries.
    pub fn expressions(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn launcher(&self) -> ScriptedLauncher {
        ScriptedLauncher {
            script: self.clone(),
        }
    }
}

pub struct ScriptedLauncher {
    script: Script,
}

impl InterpreterLauncher for ScriptedLauncher {
    fn launch(&self) -> Result<Box<dyn Interpreter>> {
        self.script.launches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.script.launch_delay);
        Ok(Box::new(ScriptedInterpreter {
            script: self.script.clone(),
        }))
    }
}

pub struct ScriptedInterpreter {
    script: Script,
}

impl Interpreter for ScriptedInterpreter {
    fn eval(&mut self, expression: &str) -> Result<EvalOutcome> {
        if expression == rexpr::installed_packages() {
            let packages = self.script.packages.lock().unwrap().clone();
            if packages.is_empty() {
                return Ok(EvalOutcome::Absent);
            }
            return Ok(EvalOutcome::Value(RValue::Strings(packages)));
        }
        if expression.contains("library(") {
            return Ok(self.script.library.lock().unwrap().clone());
        }

        self.script.log.lock().unwrap().push(expression.to_string());
        let responder = Arc::clone(&*self.script.responder.lock().unwrap());
        Ok(responder(expression))
    }

    fn is_alive(&mut self) -> bool {
        true
    }
}

pub fn value(value: RValue) -> EvalOutcome {
    EvalOutcome::Value(value)
}
