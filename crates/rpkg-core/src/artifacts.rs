//! Registration of files produced by the build.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the manifest kept in the build directory.
pub const MANIFEST_FILE: &str = "attached-artifacts.json";

/// One attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedArtifact {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub file: PathBuf,
}

/// Sink for produced artifacts.
pub trait ArtifactRegistry {
    /// Attach `file` as an artifact of type `kind`.
    fn attach(&self, kind: &str, classifier: Option<&str>, file: &Path) -> Result<()>;
}

/// Registry persisted as a JSON manifest.
///
/// Attaching the same type and classifier again replaces the earlier entry.
#[derive(Debug, Clone)]
pub struct ManifestRegistry {
    path: PathBuf,
}

impl ManifestRegistry {
    /// Registry stored in `build_dir`.
    pub fn in_build_dir(build_dir: &Path) -> Self {
        Self {
            path: build_dir.join(MANIFEST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Everything attached so far.
    pub fn attached(&self) -> Result<Vec<AttachedArtifact>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ArtifactRegistry for ManifestRegistry {
    fn attach(&self, kind: &str, classifier: Option<&str>, file: &Path) -> Result<()> {
        let mut artifacts = self.attached()?;
        artifacts.retain(|a| !(a.kind == kind && a.classifier.as_deref() == classifier));
        artifacts.push(AttachedArtifact {
            kind: kind.to_string(),
            classifier: classifier.map(str::to_string),
            file: file.to_path_buf(),
        });

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&artifacts)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}
