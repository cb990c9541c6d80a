//! Copying package sources into the output directory.
//!
//! The copy is a plain recursive mirror of the source tree. With filtering
//! enabled, text files have `${key}` and `@key@` tokens replaced by values
//! from the project properties and the configured filter files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Extensions copied verbatim even when filtering is on.
pub const DEFAULT_NON_FILTERED: &[&str] = &[
    "jpg", "jpeg", "gif", "bmp", "png", "pdf", "rda", "rds", "rdata", "gz", "zip",
];

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}\s]+)\}|@([A-Za-z0-9_.\-]+)@")
        .unwrap_or_else(|e| panic!("invalid token pattern: {e}"))
});

/// One copy of a source tree.
#[derive(Debug, Clone, Default)]
pub struct CopyRequest {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub encoding: String,
    /// Filter files, earlier files overridden by later ones.
    pub filters: Vec<PathBuf>,
    /// Whether token interpolation is applied at all.
    pub filtering: bool,
    /// Values available before any filter file is read.
    pub properties: BTreeMap<String, String>,
    /// Prefix that keeps a token from being interpolated.
    pub escape_string: Option<String>,
    /// Extensions copied verbatim, in addition to [`DEFAULT_NON_FILTERED`].
    pub non_filtered_extensions: Vec<String>,
}

/// Files written by one copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub copied: usize,
    pub filtered: usize,
}

/// Copies a source tree into the output directory.
pub trait ResourceCopier {
    fn copy(&self, request: &CopyRequest) -> Result<CopySummary>;
}

/// Recursive copier with property interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilteringCopier;

impl ResourceCopier for FilteringCopier {
    fn copy(&self, request: &CopyRequest) -> Result<CopySummary> {
        if !is_utf8(&request.encoding) {
            return Err(Error::Config(format!(
                "Encoding {} is not supported, only UTF-8 sources can be copied",
                request.encoding
            )));
        }

        let mut summary = CopySummary::default();
        if !request.source_dir.is_dir() {
            tracing::info!(
                "Source directory {} does not exist, nothing to copy",
                request.source_dir.display()
            );
            return Ok(summary);
        }

        let values = if request.filtering {
            load_filter_values(&request.properties, &request.filters)?
        } else {
            BTreeMap::new()
        };
        let filter = Interpolator {
            values: &values,
            escape: request.escape_string.as_deref().filter(|s| !s.is_empty()),
        };

        copy_tree(
            &request.source_dir,
            &request.output_dir,
            request,
            &filter,
            &mut summary,
        )?;
        tracing::debug!(
            "Copied {} files ({} filtered) to {}",
            summary.copied,
            summary.filtered,
            request.output_dir.display()
        );
        Ok(summary)
    }
}

/// Whether `encoding` names UTF-8.
pub fn is_utf8(encoding: &str) -> bool {
    matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

fn copy_tree(
    source: &Path,
    target: &Path,
    request: &CopyRequest,
    filter: &Interpolator<'_>,
    summary: &mut CopySummary,
) -> Result<()> {
    fs::create_dir_all(target)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let dest = target.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_tree(&path, &dest, request, filter, summary)?;
            continue;
        }

        summary.copied += 1;
        if !request.filtering || is_non_filtered(&path, &request.non_filtered_extensions) {
            fs::copy(&path, &dest)?;
            continue;
        }

        let bytes = fs::read(&path)?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                fs::write(&dest, filter.apply(&text))?;
                summary.filtered += 1;
            }
            Err(e) => {
                tracing::debug!("{} is not UTF-8 text, copying unfiltered", path.display());
                fs::write(&dest, e.into_bytes())?;
            }
        }
    }
    Ok(())
}

fn is_non_filtered(path: &Path, extra: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    DEFAULT_NON_FILTERED
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
        || extra
            .iter()
            .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Merge project properties with `key=value` filter files.
pub fn load_filter_values(
    properties: &BTreeMap<String, String>,
    filters: &[PathBuf],
) -> Result<BTreeMap<String, String>> {
    let mut values = properties.clone();
    for filter in filters {
        let text = fs::read_to_string(filter).map_err(|e| {
            Error::Config(format!(
                "Cannot read filter file {}: {}",
                filter.display(),
                e
            ))
        })?;
        values.extend(parse_properties(&text));
    }
    Ok(values)
}

/// Parse `key=value` (or `key: value`) lines, skipping comments.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

struct Interpolator<'a> {
    values: &'a BTreeMap<String, String>,
    escape: Option<&'a str>,
}

impl Interpolator<'_> {
    /// Replace known tokens; unknown ones are left in place.
    fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in TOKEN_RE.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let before = &text[last..whole.start()];

            if let Some(escape) = self.escape
                && let Some(kept) = before.strip_suffix(escape)
            {
                out.push_str(kept);
                out.push_str(whole.as_str());
            } else {
                out.push_str(before);
                match self.values.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(whole.as_str()),
                }
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_interpolate_both_delimiters() {
        let values = values(&[("project.version", "1.2.3"), ("name", "demo")]);
        let filter = Interpolator {
            values: &values,
            escape: None,
        };
        assert_eq!(
            filter.apply("v=${project.version} n=@name@ u=${unknown} mail=a@b"),
            "v=1.2.3 n=demo u=${unknown} mail=a@b"
        );
    }

    #[test]
    fn test_escaped_token_is_kept() {
        let values = values(&[("x", "1")]);
        let filter = Interpolator {
            values: &values,
            escape: Some("\\"),
        };
        assert_eq!(filter.apply("a \\${x} b ${x}"), "a ${x} b 1");
    }

    #[test]
    fn test_parse_properties() {
        let parsed = parse_properties("# comment\n! other\nkey = value\nempty=\nurl: http://x\n=bad\n");
        assert_eq!(
            parsed,
            vec![
                ("key".to_string(), "value".to_string()),
                ("empty".to_string(), String::new()),
                ("url".to_string(), "http://x".to_string()),
            ]
        );
    }

    #[test]
    fn test_later_filters_override() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.properties");
        let b = temp.path().join("b.properties");
        fs::write(&a, "k=a\nonly_a=1\n").unwrap();
        fs::write(&b, "k=b\n").unwrap();

        let merged = load_filter_values(&values(&[("k", "base")]), &[a, b]).unwrap();
        assert_eq!(merged["k"], "b");
        assert_eq!(merged["only_a"], "1");
    }

    #[test]
    fn test_missing_filter_file() {
        let err = load_filter_values(&BTreeMap::new(), &[PathBuf::from("/no/such.properties")])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_copy_tree_with_filtering() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(source.join("R")).unwrap();
        fs::create_dir_all(source.join("data")).unwrap();
        fs::write(source.join("DESCRIPTION"), "Version: ${project.version}\n").unwrap();
        fs::write(source.join("R").join("hello.R"), "hello <- function() '@greeting@'\n").unwrap();
        fs::write(source.join("data").join("x.rds"), "${project.version}").unwrap();
        fs::write(source.join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let request = CopyRequest {
            source_dir: source,
            output_dir: temp.path().join("out"),
            encoding: "UTF-8".to_string(),
            filtering: true,
            properties: values(&[("project.version", "1.0"), ("greeting", "hi")]),
            ..Default::default()
        };
        let summary = FilteringCopier.copy(&request).unwrap();

        assert_eq!(summary, CopySummary { copied: 4, filtered: 2 });
        let out = temp.path().join("out");
        assert_eq!(fs::read_to_string(out.join("DESCRIPTION")).unwrap(), "Version: 1.0\n");
        assert_eq!(
            fs::read_to_string(out.join("R").join("hello.R")).unwrap(),
            "hello <- function() 'hi'\n"
        );
        assert_eq!(
            fs::read_to_string(out.join("data").join("x.rds")).unwrap(),
            "${project.version}"
        );
        assert_eq!(fs::read(out.join("blob.bin")).unwrap(), vec![0xff, 0xfe, 0x00]);
    }

    #[test]
    fn test_copy_without_filtering() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("a.R"), "${x}").unwrap();

        let request = CopyRequest {
            source_dir: source,
            output_dir: temp.path().join("out"),
            encoding: "utf8".to_string(),
            properties: values(&[("x", "1")]),
            ..Default::default()
        };
        let summary = FilteringCopier.copy(&request).unwrap();
        assert_eq!(summary.filtered, 0);
        assert_eq!(fs::read_to_string(temp.path().join("out/a.R")).unwrap(), "${x}");
    }

    #[test]
    fn test_rejects_other_encodings() {
        let request = CopyRequest {
            encoding: "ISO-8859-1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            FilteringCopier.copy(&request),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_source_dir_copies_nothing() {
        let temp = TempDir::new().unwrap();
        let request = CopyRequest {
            source_dir: temp.path().join("absent"),
            output_dir: temp.path().join("out"),
            encoding: "UTF-8".to_string(),
            ..Default::default()
        };
        assert_eq!(FilteringCopier.copy(&request).unwrap(), CopySummary::default());
    }
}
