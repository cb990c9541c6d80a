//! Environment bootstrap for the embedded R session.
//!
//! Before R can be started, the process environment has to be prepared so the
//! R shared library (the bridge between a host process and the interpreter) and
//! its dependencies can be found:
//!
//! 1. Validate `R_HOME` and locate the bridge library under it
//! 2. Prepend the bridge directory and any extra shared library directories to
//!    the dynamic-library search variable and the executable search variable
//! 3. Reset the in-process library path, prepend the same directories to it and
//!    resolve the bridge over it
//! 4. Load the bridge exactly once and export `R_HOME` for the interpreter
//!
//! Every mutation is process-wide and is never reverted. A directory is
//! exported to the environment at most once, so a retry after a failed load
//! only repeats the load. The loader on Linux and macOS reads
//! `LD_LIBRARY_PATH`/`DYLD_LIBRARY_PATH` only at process start, which is why
//! the interpreter itself runs in a child process spawned after bootstrap (see
//! [`crate::session::RProcess`]).

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, OnceLock, RwLock};

use libloading::Library;

use crate::error::{Error, Result};

/// Location of the bridge library relative to `R_HOME`.
#[cfg(target_os = "macos")]
pub const BRIDGE_LIBRARY: &str = "lib/libR.dylib";
#[cfg(windows)]
pub const BRIDGE_LIBRARY: &str = "bin/x64/R.dll";
#[cfg(not(any(target_os = "macos", windows)))]
pub const BRIDGE_LIBRARY: &str = "lib/libR.so";

/// Symbol every embeddable R build exports.
const EMBEDDING_ENTRY: &[u8] = b"Rf_initEmbeddedR\0";

/// Environment variable pointing the interpreter at its home.
pub const R_HOME_VAR: &str = "R_HOME";

/// A search-path channel mutated during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPathChannel {
    /// Variable consulted by the platform's dynamic loader.
    DynamicLibrary,
    /// Variable consulted when resolving executables (and DLLs on Windows).
    Executable,
    /// rpkg's own library path, over which the bridge is resolved.
    InProcess,
}

impl SearchPathChannel {
    /// Environment variable backing this channel, if any.
    pub fn env_var(self) -> Option<&'static str> {
        match self {
            SearchPathChannel::DynamicLibrary if cfg!(target_os = "macos") => {
                Some("DYLD_LIBRARY_PATH")
            }
            SearchPathChannel::DynamicLibrary if cfg!(windows) => Some("PATH"),
            SearchPathChannel::DynamicLibrary => Some("LD_LIBRARY_PATH"),
            SearchPathChannel::Executable => Some("PATH"),
            SearchPathChannel::InProcess => None,
        }
    }
}

/// In-process library search path.
///
/// Seeded lazily from the dynamic-library variable the first time it is read;
/// [`reset_loader_cache`] discards the snapshot so the next read sees the
/// mutated environment.
static LIBRARY_PATH: RwLock<Option<Vec<PathBuf>>> = RwLock::new(None);

/// The bridge library, loaded at most once per process.
static BRIDGE: OnceLock<Library> = OnceLock::new();

/// Process-wide bootstrap progress.
#[derive(Debug)]
struct Bootstrap {
    /// Directories already prepended to the environment channels.
    exported: Vec<PathBuf>,
    /// Result of a completed bootstrap, shared by every later caller.
    handle: Option<BridgeHandle>,
}

static STATE: Mutex<Bootstrap> = Mutex::new(Bootstrap {
    exported: Vec::new(),
    handle: None,
});

/// Handle to a prepared environment with the bridge library loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeHandle {
    /// Validated R home directory.
    pub r_home: PathBuf,
    /// Bridge library as resolved over the in-process library path.
    pub bridge_path: PathBuf,
    /// Directories prepended to every search-path channel, in order.
    pub search_dirs: Vec<PathBuf>,
}

impl BridgeHandle {
    /// Path of the R front-end executable.
    pub fn r_executable(&self) -> PathBuf {
        let name = if cfg!(windows) { "R.exe" } else { "R" };
        self.r_home.join("bin").join(name)
    }
}

/// How a successful load found the bridge library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// The library was already resident in the process.
    AlreadyLoaded,
}

/// Loads the bridge library and verifies it can host an interpreter.
pub trait BridgeLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadStatus>;
}

/// [`BridgeLoader`] backed by the platform's dynamic linker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicLoader;

impl BridgeLoader for DynamicLoader {
    fn load(&self, path: &Path) -> Result<LoadStatus> {
        if BRIDGE.get().is_some() {
            return Ok(LoadStatus::AlreadyLoaded);
        }

        tracing::debug!("Loading bridge library {}", path.display());
        // SAFETY: the R shared library has no load-time initializers with
        // preconditions; R itself is only initialized in the child process.
        let library = match unsafe { Library::new(path) } {
            Ok(library) => library,
            Err(e) if is_already_loaded(&e.to_string()) => {
                tracing::debug!("Bridge library already loaded: {}", e);
                return Ok(LoadStatus::AlreadyLoaded);
            }
            Err(e) => return Err(Error::LibraryLoad(e)),
        };

        // SAFETY: only the presence of the symbol is checked, it is never called.
        let embeddable =
            unsafe { library.get::<unsafe extern "C" fn()>(EMBEDDING_ENTRY) }.is_ok();
        if !embeddable {
            return Err(Error::Config(format!(
                "Library {} does not export an embedding entry point.",
                path.display()
            )));
        }

        let _ = BRIDGE.set(library);
        Ok(LoadStatus::Loaded)
    }
}

/// Validate `r_home` and return the bridge library path inside it.
pub fn locate_bridge(r_home: Option<&Path>) -> Result<PathBuf> {
    let r_home = r_home.filter(|home| home.is_dir()).ok_or_else(invalid_home)?;

    let bridge = r_home.join(BRIDGE_LIBRARY);
    if !bridge.is_file() {
        return Err(Error::Config(format!(
            "Library {} cannot be found. Ensure that R was built as a shared library.",
            bridge.display()
        )));
    }

    Ok(bridge)
}

/// Prepare the environment and load the bridge library.
pub fn ensure_ready(r_home: Option<&Path>, shared_libs: &[PathBuf]) -> Result<BridgeHandle> {
    ensure_ready_with(r_home, shared_libs, &DynamicLoader)
}

/// Prepare the environment and load the bridge library with `loader`.
///
/// The first successful call performs every side effect; later calls return
/// the same handle without touching the environment again. A failed load is
/// not recorded, so the next call retries it.
pub fn ensure_ready_with(
    r_home: Option<&Path>,
    shared_libs: &[PathBuf],
    loader: &dyn BridgeLoader,
) -> Result<BridgeHandle> {
    let mut state = STATE
        .lock()
        .map_err(|_| Error::Runtime("bootstrap lock poisoned".to_string()))?;
    if let Some(handle) = state.handle.as_ref() {
        return Ok(handle.clone());
    }

    let located = absolute(&locate_bridge(r_home)?)?;
    let r_home = absolute(r_home.ok_or_else(invalid_home)?)?;

    let mut search_dirs = Vec::with_capacity(shared_libs.len() + 1);
    if let Some(dir) = located.parent() {
        search_dirs.push(dir.to_path_buf());
    }
    for lib in shared_libs {
        search_dirs.push(absolute(lib)?);
    }

    let fresh: Vec<PathBuf> = search_dirs
        .iter()
        .filter(|dir| !state.exported.contains(dir))
        .cloned()
        .collect();
    if !fresh.is_empty() {
        export_search_dirs(&fresh)?;
        state.exported.extend(fresh);
    }

    reset_loader_cache();
    prepend_library_path(&search_dirs);

    let file_name = located.file_name().ok_or_else(|| {
        Error::Config(format!("Invalid bridge library path {}", located.display()))
    })?;
    let bridge_path = resolve_library(file_name, &library_path()).ok_or_else(|| {
        Error::Config(format!(
            "Library {} cannot be found on the library path.",
            file_name.to_string_lossy()
        ))
    })?;

    if loader.load(&bridge_path)? == LoadStatus::AlreadyLoaded {
        tracing::debug!("Reusing resident bridge library {}", bridge_path.display());
    }
    set_env(R_HOME_VAR, r_home.as_os_str());

    let handle = BridgeHandle {
        r_home,
        bridge_path,
        search_dirs,
    };
    state.handle = Some(handle.clone());
    Ok(handle)
}

/// Prepend `dirs` to the environment-backed channels.
fn export_search_dirs(dirs: &[PathBuf]) -> Result<()> {
    let mut updated: Vec<&str> = Vec::new();
    for channel in [SearchPathChannel::DynamicLibrary, SearchPathChannel::Executable] {
        // On Windows both channels are PATH
        if let Some(var) = channel.env_var()
            && !updated.contains(&var)
        {
            updated.push(var);
            let value = prepend_paths(dirs, std::env::var_os(var).as_deref())?;
            tracing::debug!("Setting {} to {}", var, value.to_string_lossy());
            set_env(var, &value);
        }
    }
    Ok(())
}

/// Build a search-path value with `dirs` in front of `prior`.
pub fn prepend_paths(dirs: &[PathBuf], prior: Option<&OsStr>) -> Result<OsString> {
    let mut entries: Vec<PathBuf> = dirs.to_vec();
    if let Some(prior) = prior.filter(|p| !p.is_empty()) {
        entries.extend(std::env::split_paths(prior));
    }
    std::env::join_paths(entries)
        .map_err(|e| Error::Config(format!("Invalid library search path: {}", e)))
}

/// Current in-process library search path.
pub fn library_path() -> Vec<PathBuf> {
    if let Ok(guard) = LIBRARY_PATH.read()
        && let Some(paths) = guard.as_ref()
    {
        return paths.clone();
    }

    let seeded = SearchPathChannel::DynamicLibrary
        .env_var()
        .and_then(std::env::var_os)
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default();
    if let Ok(mut guard) = LIBRARY_PATH.write() {
        *guard = Some(Vec::clone(&seeded));
    }
    seeded
}

/// Forget the cached in-process library path.
///
/// Best effort: the platform loader keeps its own startup snapshot, which
/// cannot be reset from inside the process.
pub fn reset_loader_cache() {
    if let Ok(mut guard) = LIBRARY_PATH.write() {
        *guard = None;
    }
}

fn prepend_library_path(dirs: &[PathBuf]) {
    let mut paths = library_path();
    let mut merged = dirs.to_vec();
    merged.retain(|dir| !paths.contains(dir));
    merged.append(&mut paths);
    if let Ok(mut guard) = LIBRARY_PATH.write() {
        *guard = Some(merged);
    }
}

/// First file called `name` in `paths`.
pub fn resolve_library(name: &OsStr, paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().map(|dir| dir.join(name)).find(|path| path.is_file())
}

/// Whether a load failure only reports a library that is already resident.
fn is_already_loaded(message: &str) -> bool {
    message.contains("already loaded")
}

fn invalid_home() -> Error {
    Error::Config(
        "Environment variable R_HOME is not set or invalid. Either set it or use the r_home setting."
            .to_string(),
    )
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

fn set_env(key: &str, value: &OsStr) {
    // SAFETY: only called from `ensure_ready_with` while holding the bootstrap
    // lock, before the R child process or any reader thread is spawned.
    unsafe { std::env::set_var(key, value) };
}

/// Find an R home when none is configured.
///
/// Checks `R_HOME`, then asks the `R` executable on `PATH` via `R RHOME`.
pub fn discover_r_home() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os(R_HOME_VAR).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(home));
    }

    let r = which::which("R").ok()?;
    let output = Command::new(r).arg("RHOME").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let home = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!home.is_empty()).then(|| PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_prepend_paths_keeps_prior_entries_last() {
        let dirs = vec![PathBuf::from("/opt/R/lib"), PathBuf::from("/opt/extra")];
        let prior = std::env::join_paths([PathBuf::from("/usr/lib")]).unwrap();

        let value = prepend_paths(&dirs, Some(&prior)).unwrap();
        let entries: Vec<PathBuf> = std::env::split_paths(&value).collect();

        assert_eq!(
            entries,
            vec![
                PathBuf::from("/opt/R/lib"),
                PathBuf::from("/opt/extra"),
                PathBuf::from("/usr/lib"),
            ]
        );
    }

    #[test]
    fn test_prepend_paths_without_prior() {
        let dirs = vec![PathBuf::from("/opt/R/lib")];
        let value = prepend_paths(&dirs, None).unwrap();
        assert_eq!(value, OsString::from("/opt/R/lib"));

        let empty = OsString::new();
        let value = prepend_paths(&dirs, Some(&empty)).unwrap();
        assert_eq!(value, OsString::from("/opt/R/lib"));
    }

    #[test]
    fn test_locate_bridge_requires_home() {
        let err = locate_bridge(None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("R_HOME"));

        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(matches!(locate_bridge(Some(&missing)), Err(Error::Config(_))));
    }

    #[test]
    fn test_locate_bridge_requires_library() {
        let temp = TempDir::new().unwrap();
        let err = locate_bridge(Some(temp.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("cannot be found"));

        let bridge = temp.path().join(BRIDGE_LIBRARY);
        fs::create_dir_all(bridge.parent().unwrap()).unwrap();
        fs::write(&bridge, b"not really a library").unwrap();
        assert_eq!(locate_bridge(Some(temp.path())).unwrap(), bridge);
    }

    #[test]
    fn test_ensure_ready_fails_before_touching_environment() {
        let temp = TempDir::new().unwrap();
        let err = ensure_ready(Some(temp.path()), &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_resolve_library_takes_first_match() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join("libR.so"), b"").unwrap();
        let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];

        assert_eq!(
            resolve_library(OsStr::new("libR.so"), &paths),
            Some(second.path().join("libR.so"))
        );

        fs::write(first.path().join("libR.so"), b"").unwrap();
        assert_eq!(
            resolve_library(OsStr::new("libR.so"), &paths),
            Some(first.path().join("libR.so"))
        );
        assert_eq!(resolve_library(OsStr::new("libRblas.so"), &paths), None);
    }

    #[test]
    fn test_already_loaded_messages() {
        assert!(is_already_loaded(
            "LoadLibraryExW failed: DLL already loaded in another class loader"
        ));
        assert!(!is_already_loaded("dlopen failed: invalid ELF header"));
    }

    #[test]
    fn test_r_executable_path() {
        let handle = BridgeHandle {
            r_home: PathBuf::from("/opt/R"),
            bridge_path: PathBuf::from("/opt/R").join(BRIDGE_LIBRARY),
            search_dirs: Vec::new(),
        };
        assert!(handle.r_executable().starts_with("/opt/R/bin"));
    }

    #[test]
    fn test_channel_variables() {
        assert_eq!(SearchPathChannel::Executable.env_var(), Some("PATH"));
        assert_eq!(SearchPathChannel::InProcess.env_var(), None);
        assert!(SearchPathChannel::DynamicLibrary.env_var().is_some());
    }
}
