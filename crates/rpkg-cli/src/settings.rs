//! Location of the R installation.
//!
//! Settings are layered, first match wins:
//! 1. command-line flags
//! 2. the `[r]` table of `rpkg.toml`
//! 3. the user settings file `<config dir>/rpkg/settings.toml`
//! 4. `R_HOME`, then `R RHOME` of the `R` found on `PATH`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use rpkg_core::RLauncher;
use rpkg_core::bootstrap;
use rpkg_core::project::RConfig;

/// Options given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub r_home: Option<PathBuf>,
    pub shared_libs: Vec<PathBuf>,
}

/// Contents of the user settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub r_home: Option<PathBuf>,
    pub shared_libs: Vec<PathBuf>,
}

impl UserSettings {
    /// Default location of the settings file.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rpkg").join("settings.toml"))
    }

    /// Load the settings file; a missing file yields defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }
}

/// Build the interpreter launcher from all configuration layers.
pub fn resolve_launcher(options: &RuntimeOptions, project: &RConfig) -> anyhow::Result<RLauncher> {
    let user = match UserSettings::path() {
        Some(path) => UserSettings::load(&path)?,
        None => UserSettings::default(),
    };
    Ok(resolve(options, project, &user, bootstrap::discover_r_home))
}

fn resolve(
    options: &RuntimeOptions,
    project: &RConfig,
    user: &UserSettings,
    discover: impl FnOnce() -> Option<PathBuf>,
) -> RLauncher {
    let r_home = options
        .r_home
        .clone()
        .or_else(|| project.home.clone())
        .or_else(|| user.r_home.clone())
        .or_else(discover);

    let mut shared_libs: Vec<PathBuf> = Vec::new();
    for dir in options
        .shared_libs
        .iter()
        .chain(&project.shared_libs)
        .chain(&user.shared_libs)
    {
        if !shared_libs.contains(dir) {
            shared_libs.push(dir.clone());
        }
    }

    tracing::debug!("Using R home {:?}", r_home);
    RLauncher::new(r_home, shared_libs)
}
