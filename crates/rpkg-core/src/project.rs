//! Project model read from `rpkg.toml`.
//!
//! ```text
//! project/
//! ├── rpkg.toml
//! ├── src/main/R/       # package sources (DESCRIPTION, R/, man/, ...)
//! └── target/           # build directory
//!     ├── R/            # prepared sources, documented and checked here
//!     └── <name>_<version>.tar.gz
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::diagnostics::NullResult;
use crate::error::{Error, Result};

/// Name of the project descriptor file.
pub const PROJECT_FILE: &str = "rpkg.toml";

const VERSION_PATTERN: &str = r"(\d+[-.]\d+([-.]\d+)?).*";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(VERSION_PATTERN).unwrap_or_else(|e| panic!("invalid version pattern: {e}"))
});

/// Validate a project version and reduce it to an R package version.
///
/// `1.2.3-SNAPSHOT` becomes `1.2.3`; a version without two numeric
/// components is rejected.
pub fn check_version(version: &str) -> Result<String> {
    VERSION_RE
        .captures(version)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            Error::Config(format!(
                "Project version \"{}\" does not match regular expression \"{}\"",
                version, VERSION_PATTERN
            ))
        })
}

/// A developer listed in the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Developer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// `[package]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
    /// Artifact id; also the R package name.
    pub name: String,
    /// Project version, possibly with a qualifier such as `-SNAPSHOT`.
    pub version: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub developers: Vec<Developer>,
}

/// `[layout]` table, paths relative to the project directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub directory: PathBuf,
    pub output_directory: PathBuf,
    pub source_directory: Option<PathBuf>,
    pub encoding: Option<String>,
    pub filters: Vec<PathBuf>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("target"),
            output_directory: PathBuf::from("target/R"),
            source_directory: None,
            encoding: None,
            filters: Vec::new(),
        }
    }
}

/// `[r]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RConfig {
    pub home: Option<PathBuf>,
    pub shared_libs: Vec<PathBuf>,
}

/// `[goals.sources]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub skip: bool,
    pub filter_sources: bool,
    pub filters: Vec<PathBuf>,
    pub use_build_filters: bool,
    pub escape_string: Option<String>,
    pub non_filtered_extensions: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            skip: false,
            filter_sources: true,
            filters: Vec::new(),
            use_build_filters: true,
            escape_string: None,
            non_filtered_extensions: Vec::new(),
        }
    }
}

/// `[goals.document]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Comma-separated roclet names.
    pub roclets: Option<String>,
}

/// What the check goal runs `R CMD check` on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckTarget {
    /// The archive produced by the build goal.
    #[default]
    Built,
    /// The prepared sources in the output directory.
    Source,
}

/// `[goals.check]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub target: CheckTarget,
    /// Extra R arguments appended to the check call.
    pub args: Option<String>,
    pub null_result: NullResult,
}

/// `[goals.build]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub attach_artifact: bool,
    pub classifier: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            attach_artifact: true,
            classifier: None,
        }
    }
}

/// `[goals.validate]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    pub skip: bool,
}

/// `[goals]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoalsConfig {
    pub sources: SourcesConfig,
    pub document: DocumentConfig,
    pub check: CheckConfig,
    pub build: BuildConfig,
    pub validate: ValidateConfig,
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    package: PackageInfo,
    #[serde(default)]
    layout: Layout,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    r: RConfig,
    #[serde(default)]
    goals: GoalsConfig,
}

/// A loaded project with paths resolved against its base directory.
#[derive(Debug, Clone)]
pub struct Project {
    pub base_dir: PathBuf,
    pub package: PackageInfo,
    /// Build directory; R's working directory during every stage.
    pub build_dir: PathBuf,
    /// Directory holding the prepared package sources.
    pub output_dir: PathBuf,
    /// Configured source directory, if any.
    pub source_dir: Option<PathBuf>,
    pub encoding: Option<String>,
    /// Filter files from the layout, resolved.
    pub build_filters: Vec<PathBuf>,
    pub properties: BTreeMap<String, String>,
    pub r: RConfig,
    pub goals: GoalsConfig,
}

impl Project {
    /// Load `rpkg.toml` from a project directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(PROJECT_FILE);
        if !path.is_file() {
            return Err(Error::Config(format!(
                "No {} found in {}",
                PROJECT_FILE,
                dir.display()
            )));
        }
        Self::load(&path)
    }

    /// Load a project descriptor file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let base_dir = std::path::absolute(parent)?;
        Self::parse(&text, &base_dir)
    }

    /// Parse descriptor text, resolving paths against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let file: ProjectFile = toml::from_str(text)?;
        let resolve = |p: &Path| base_dir.join(p);

        let mut r = file.r;
        r.home = r.home.as_deref().map(resolve);
        r.shared_libs = r.shared_libs.iter().map(|p| resolve(p)).collect();

        let mut goals = file.goals;
        goals.sources.filters = goals.sources.filters.iter().map(|p| resolve(p)).collect();

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            package: file.package,
            build_dir: resolve(&file.layout.directory),
            output_dir: resolve(&file.layout.output_directory),
            source_dir: file.layout.source_directory.as_deref().map(resolve),
            encoding: file.layout.encoding,
            build_filters: file.layout.filters.iter().map(|p| resolve(p)).collect(),
            properties: file.properties,
            r,
            goals,
        })
    }

    /// Validated R package version.
    pub fn r_version(&self) -> Result<String> {
        check_version(&self.package.version)
    }

    /// Create the build and output directories.
    pub fn setup_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.build_dir)?;
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Directory the R sources are copied from.
    ///
    /// Defaults to `src/main/R`, which also replaces a source directory that
    /// points at Java sources.
    pub fn r_source_dir(&self) -> PathBuf {
        match &self.source_dir {
            Some(dir) if !is_java_source_dir(dir) => dir.clone(),
            _ => self.base_dir.join("src").join("main").join("R"),
        }
    }

    /// Path of the package `DESCRIPTION` in the output directory.
    pub fn description_path(&self) -> PathBuf {
        self.output_dir.join("DESCRIPTION")
    }

    /// Path of the archive the build goal produces for `version`.
    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.build_dir
            .join(format!("{}_{}.tar.gz", self.package.name, version))
    }

    /// Project properties available to source filtering.
    pub fn filter_properties(&self) -> BTreeMap<String, String> {
        let mut props = self.properties.clone();
        props.insert("project.name".to_string(), self.package.name.clone());
        props.insert("project.version".to_string(), self.package.version.clone());
        props.insert(
            "project.build.directory".to_string(),
            self.build_dir.to_string_lossy().into_owned(),
        );
        props.insert(
            "project.build.outputDirectory".to_string(),
            self.output_dir.to_string_lossy().into_owned(),
        );
        props
    }

    /// Filters for the sources goal: layout filters first, then goal filters.
    pub fn combined_filters(&self) -> Vec<PathBuf> {
        let goal = &self.goals.sources;
        let mut filters = Vec::new();
        if goal.use_build_filters {
            filters.extend(self.build_filters.iter().cloned());
        }
        filters.extend(goal.filters.iter().cloned());
        filters
    }

    /// Metadata written into `DESCRIPTION` by the sources stage.
    pub fn descriptor(&self) -> Result<PackageDescriptor> {
        Ok(PackageDescriptor {
            version: self.r_version()?,
            licenses: self.package.licenses.clone(),
            developers: self.package.developers.clone(),
        })
    }
}

fn is_java_source_dir(dir: &Path) -> bool {
    dir.ends_with("src/main/java")
}

/// Project metadata as written into `DESCRIPTION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Normalized version.
    pub version: String,
    pub licenses: Vec<String>,
    pub developers: Vec<Developer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[package]
name = "demo"
version = "1.2.3-SNAPSHOT"
"#;

    #[test]
    fn test_check_version() {
        assert_eq!(check_version("1.2.3-SNAPSHOT").unwrap(), "1.2.3");
        assert_eq!(check_version("1.2").unwrap(), "1.2");
        assert_eq!(check_version("0.9-1").unwrap(), "0.9-1");
        assert_eq!(check_version("2.0.0.1").unwrap(), "2.0.0");

        let err = check_version("abc").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("\"abc\""));
        assert!(check_version("7").is_err());
    }

    #[test]
    fn test_parse_defaults() {
        let project = Project::parse(MINIMAL, Path::new("/work/demo")).unwrap();
        assert_eq!(project.build_dir, PathBuf::from("/work/demo/target"));
        assert_eq!(project.output_dir, PathBuf::from("/work/demo/target/R"));
        assert_eq!(project.r_source_dir(), PathBuf::from("/work/demo/src/main/R"));
        assert_eq!(
            project.archive_path("1.2.3"),
            PathBuf::from("/work/demo/target/demo_1.2.3.tar.gz")
        );
        assert!(project.goals.build.attach_artifact);
        assert!(project.goals.sources.filter_sources);
        assert_eq!(project.goals.check.target, CheckTarget::Built);
        assert_eq!(project.goals.check.null_result, NullResult::Pass);
    }

    #[test]
    fn test_parse_full() {
        let text = r#"
[package]
name = "demo"
version = "2.0"
licenses = ["GPL-2", "GPL-3"]

[[package.developers]]
name = "Ada"
email = "ada@example.org"

[layout]
directory = "out"
output_directory = "out/pkg"
source_directory = "src/main/java"
filters = ["dev.properties"]

[r]
home = "/opt/R"
shared_libs = ["libs"]

[goals.sources]
filters = ["extra.properties"]

[goals.check]
target = "source"
null_result = "fail"

[goals.build]
attach_artifact = false
classifier = "src"
"#;
        let project = Project::parse(text, Path::new("/p")).unwrap();
        assert_eq!(project.package.developers[0].email.as_deref(), Some("ada@example.org"));
        assert_eq!(project.output_dir, PathBuf::from("/p/out/pkg"));
        assert_eq!(project.r_source_dir(), PathBuf::from("/p/src/main/R"));
        assert_eq!(project.r.home, Some(PathBuf::from("/opt/R")));
        assert_eq!(project.r.shared_libs, vec![PathBuf::from("/p/libs")]);
        assert_eq!(
            project.combined_filters(),
            vec![
                PathBuf::from("/p/dev.properties"),
                PathBuf::from("/p/extra.properties")
            ]
        );
        assert_eq!(project.goals.check.target, CheckTarget::Source);
        assert_eq!(project.goals.check.null_result, NullResult::Fail);
        assert_eq!(project.goals.build.classifier.as_deref(), Some("src"));
    }

    #[test]
    fn test_combined_filters_without_build_filters() {
        let text = format!(
            "{MINIMAL}\n[layout]\nfilters = [\"a.properties\"]\n[goals.sources]\nuse_build_filters = false\n"
        );
        let project = Project::parse(&text, Path::new("/p")).unwrap();
        assert!(project.combined_filters().is_empty());
    }

    #[test]
    fn test_from_dir_and_setup() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(Project::from_dir(temp.path()), Err(Error::Config(_))));

        fs::write(temp.path().join(PROJECT_FILE), MINIMAL).unwrap();
        let project = Project::from_dir(temp.path()).unwrap();
        project.setup_directories().unwrap();
        assert!(project.build_dir.is_dir());
        assert!(project.output_dir.is_dir());

        let descriptor = project.descriptor().unwrap();
        assert_eq!(descriptor.version, "1.2.3");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Project::parse("[package]\nname = 1", Path::new("/p")).unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
