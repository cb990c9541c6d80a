//! Builders for the R statements rpkg sends to the interpreter.

use std::path::Path;

/// Class attached to values produced by the error guard.
pub const ERROR_CLASS: &str = "rpkg_error";

/// Package-development toolkit every stage relies on.
pub const DEVTOOLS: &str = "devtools";

/// Quote `s` as an R string literal.
pub fn r_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a path as an R string literal.
pub fn r_path(path: &Path) -> String {
    r_string(&path.to_string_lossy())
}

/// Wrap `expression` so an R error becomes a tagged value instead of a fault.
pub fn guard(expression: &str) -> String {
    format!(
        "tryCatch({{\n{}\n}}, error = function(e) structure(conditionMessage(e), class = {}))",
        expression,
        r_string(ERROR_CLASS)
    )
}

/// Turn a comma-separated roclet list into an R character vector.
///
/// Returns `None` when no roclet names are given, so the argument can be
/// left out and roxygen falls back to its defaults.
pub fn roclets(list: Option<&str>) -> Option<String> {
    let names: Vec<String> = list?
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(r_string)
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(format!("c({})", names.join(", ")))
    }
}

/// Names of all installed packages.
pub fn installed_packages() -> String {
    "installed.packages()[, 'Package']".to_string()
}

/// Attach a package.
pub fn library(package: &str) -> String {
    format!("library({})", r_string(package))
}

/// Change the working directory.
pub fn setwd(dir: &Path) -> String {
    format!("setwd({})", r_path(dir))
}

/// Build a source archive of the package in `pkg_dir` into `dest`.
pub fn build(pkg_dir: &Path, dest: &Path) -> String {
    format!(
        "devtools::build(pkg = as.package({}), quiet = TRUE, path = {})",
        r_path(pkg_dir),
        r_path(dest)
    )
}

/// Run `R CMD check` on a built archive.
pub fn check_built(archive: &Path, check_dir: &Path, extra: Option<&str>) -> String {
    format!(
        "devtools::check_built(path = {}, quiet = TRUE, check_dir = {}{})",
        r_path(archive),
        r_path(check_dir),
        extra_args(extra)
    )
}

/// Run `R CMD check` on the package sources.
pub fn check_source(pkg_dir: &Path, check_dir: &Path, extra: Option<&str>) -> String {
    format!(
        "devtools::check(pkg = as.package({}), quiet = TRUE, check_dir = {}{})",
        r_path(pkg_dir),
        r_path(check_dir),
        extra_args(extra)
    )
}

/// Generate documentation with roxygen.
pub fn document(pkg_dir: &Path, roclets: Option<&str>) -> String {
    let roclets = roclets
        .map(|vector| format!(", roclets = {}", vector))
        .unwrap_or_default();
    format!(
        "devtools::document(pkg = as.package({}){})",
        r_path(pkg_dir),
        roclets
    )
}

/// Validate a DESCRIPTION file against the R extension manual rules.
pub fn check_description(description: &Path) -> String {
    format!("tools:::.check_package_description({})", r_path(description))
}

fn extra_args(extra: Option<&str>) -> String {
    match extra.map(str::trim).filter(|s| !s.is_empty()) {
        Some(args) => format!(", {}", args),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_r_string_escapes() {
        assert_eq!(r_string("plain"), "\"plain\"");
        assert_eq!(r_string("C:\\pkg"), "\"C:\\\\pkg\"");
        assert_eq!(r_string("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn test_guard_wraps_expression() {
        let wrapped = guard("1 + 1");
        assert!(wrapped.starts_with("tryCatch({\n1 + 1\n}"));
        assert!(wrapped.contains("class = \"rpkg_error\""));
    }

    #[test]
    fn test_roclets() {
        assert_eq!(roclets(None), None);
        assert_eq!(roclets(Some("")), None);
        assert_eq!(roclets(Some(" , ")), None);
        assert_eq!(roclets(Some("rd")), Some("c(\"rd\")".to_string()));
        assert_eq!(
            roclets(Some("rd, namespace,collate")),
            Some("c(\"rd\", \"namespace\", \"collate\")".to_string())
        );
    }

    #[test]
    fn test_document_statement() {
        let pkg = PathBuf::from("/work/target/R");
        assert_eq!(
            document(&pkg, None),
            "devtools::document(pkg = as.package(\"/work/target/R\"))"
        );
        assert_eq!(
            document(&pkg, Some("c(\"rd\")")),
            "devtools::document(pkg = as.package(\"/work/target/R\"), roclets = c(\"rd\"))"
        );
    }

    #[test]
    fn test_check_statements() {
        let archive = PathBuf::from("/work/target/pkg_1.0.tar.gz");
        let dir = PathBuf::from("/work/target");
        assert_eq!(
            check_built(&archive, &dir, None),
            "devtools::check_built(path = \"/work/target/pkg_1.0.tar.gz\", quiet = TRUE, check_dir = \"/work/target\")"
        );
        assert!(check_built(&archive, &dir, Some("args = '--no-manual'"))
            .ends_with(", args = '--no-manual')"));
        assert!(check_source(&dir, &dir, Some("  ")).ends_with("check_dir = \"/work/target\")"));
    }
}
