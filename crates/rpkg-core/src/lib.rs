//! Core of rpkg, a build driver for R packages.
//!
//! This crate provides:
//! - Bootstrapping of the R environment and its bridge library
//! - A shared, lazily started R session with serialized evaluation
//! - Parsing of `R CMD check` results into a verdict
//! - The pipeline stages: sources, document, validate, check, build

pub mod artifacts;
pub mod bootstrap;
pub mod description;
pub mod diagnostics;
pub mod error;
pub mod project;
pub mod resources;
pub mod rexpr;
pub mod session;
pub mod stages;
pub mod value;

pub use artifacts::{ArtifactRegistry, AttachedArtifact, ManifestRegistry};
pub use diagnostics::{CheckVerdict, NullResult, Severity, parse_check_result};
pub use error::{Error, ErrorKind, Result};
pub use project::{PackageDescriptor, Project, check_version};
pub use resources::{CopyRequest, FilteringCopier, ResourceCopier};
pub use session::{Interpreter, InterpreterLauncher, RLauncher, Session, SessionManager};
pub use stages::{Goal, Phase, StageContext, StageReport, StageState};
pub use value::{EvalOutcome, Field, RValue};
