//! Pipeline stages.
//!
//! Each stage is a short sequence against the shared session:
//!
//! ```text
//! NotStarted ─► DirectoriesReady ─► SessionAcquired ─► VerbEvaluated ─► Parsed
//!      │               │                   │                 │
//!      └───────────────┴───────────────────┴─────────────────┴──────► Failed
//! ```
//!
//! No transition is retried. Ordering several stages is up to the caller, see
//! [`Goal::phase`].

mod build;
mod check;
mod document;
mod sources;
mod validate;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::artifacts::ArtifactRegistry;
use crate::error::{Error, Result};
use crate::project::Project;
use crate::resources::ResourceCopier;
use crate::rexpr;
use crate::session::{Session, SessionManager};

pub use build::build;
pub use check::check;
pub use document::document;
pub use sources::sources;
pub use validate::validate;

/// Everything a stage needs from its caller.
pub struct StageContext<'a> {
    pub project: &'a Project,
    pub sessions: &'a SessionManager,
    pub copier: &'a dyn ResourceCopier,
    pub registry: &'a dyn ArtifactRegistry,
}

/// Lifecycle phase a goal is bound to by default, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    ProcessSources,
    Compile,
    PreparePackage,
    Package,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ProcessSources => "process-sources",
            Phase::Compile => "compile",
            Phase::PreparePackage => "prepare-package",
            Phase::Package => "package",
        };
        f.write_str(name)
    }
}

/// A runnable stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Goal {
    Sources,
    Document,
    Validate,
    Check,
    Build,
}

impl Goal {
    /// All goals in lifecycle order.
    pub const ALL: [Goal; 5] = [
        Goal::Sources,
        Goal::Document,
        Goal::Validate,
        Goal::Check,
        Goal::Build,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Goal::Sources => "sources",
            Goal::Document => "document",
            Goal::Validate => "validate",
            Goal::Check => "check",
            Goal::Build => "build",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            Goal::Sources => Phase::ProcessSources,
            Goal::Document => Phase::Compile,
            Goal::Validate | Goal::Check => Phase::PreparePackage,
            Goal::Build => Phase::Package,
        }
    }

    /// Run the stage.
    pub fn execute(self, ctx: &StageContext<'_>) -> Result<StageReport> {
        match self {
            Goal::Sources => sources(ctx),
            Goal::Document => document(ctx),
            Goal::Validate => validate(ctx),
            Goal::Check => check(ctx),
            Goal::Build => build(ctx),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Goal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Goal::ALL
            .into_iter()
            .find(|goal| goal.name() == s)
            .ok_or_else(|| Error::Config(format!("Unknown goal '{}'", s)))
    }
}

/// Sort goals into lifecycle order, dropping duplicates.
///
/// Goals sharing a phase keep the order they were given in.
pub fn plan(goals: &[Goal]) -> Vec<Goal> {
    let mut planned: Vec<Goal> = Vec::with_capacity(goals.len());
    for goal in goals {
        if !planned.contains(goal) {
            planned.push(*goal);
        }
    }
    planned.sort_by_key(|goal| goal.phase());
    planned
}

/// Progress of one stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    NotStarted,
    DirectoriesReady,
    SessionAcquired,
    VerbEvaluated,
    Parsed,
    Failed,
}

/// Result of a successful stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub goal: Goal,
    pub state: StageState,
    pub skipped: bool,
}

impl StageReport {
    fn skipped(goal: Goal) -> Self {
        tracing::info!("Skipping the execution.");
        Self {
            goal,
            state: StageState::NotStarted,
            skipped: true,
        }
    }
}

/// Tracks the state machine of one invocation.
struct StageRun {
    goal: Goal,
    state: StageState,
}

impl StageRun {
    fn new(goal: Goal) -> Self {
        Self {
            goal,
            state: StageState::NotStarted,
        }
    }

    fn advance(&mut self, next: StageState) {
        tracing::debug!("{}: {:?} -> {:?}", self.goal, self.state, next);
        self.state = next;
    }

    /// Run `body`, moving to `Failed` if it returns an error.
    fn finish(mut self, body: impl FnOnce(&mut Self) -> Result<()>) -> Result<StageReport> {
        match body(&mut self) {
            Ok(()) => Ok(StageReport {
                goal: self.goal,
                state: self.state,
                skipped: false,
            }),
            Err(e) => {
                self.advance(StageState::Failed);
                Err(e)
            }
        }
    }

    /// Common prologue: validate the version, create directories, acquire
    /// the session and move R into the build directory.
    ///
    /// Returns the normalized version.
    fn prepare(&mut self, ctx: &StageContext<'_>) -> Result<(String, Arc<Session>)> {
        let version = ctx.project.r_version()?;
        ctx.project.setup_directories()?;
        self.advance(StageState::DirectoriesReady);

        let session = ctx.sessions.session()?;
        self.advance(StageState::SessionAcquired);

        session.eval(&rexpr::setwd(&ctx.project.build_dir))?;
        Ok((version, session))
    }
}
