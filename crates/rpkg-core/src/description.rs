//! In-place patching of the package `DESCRIPTION` file.
//!
//! After the sources are copied, the `Version`, `License`, `Author` and
//! `Maintainer` fields are replaced with values from the project so the two
//! never drift apart.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::project::PackageDescriptor;

/// Largest `DESCRIPTION` file that will be rewritten, in bytes.
pub const MAX_DESCRIPTION_SIZE: u64 = 100_000;

/// Rewrite the `DESCRIPTION` at `path` if it exists.
///
/// Returns `false` when there is no file to patch.
pub fn patch_description(path: &Path, descriptor: &PackageDescriptor) -> Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if metadata.len() > MAX_DESCRIPTION_SIZE {
        return Err(Error::Config("DESCRIPTION file is too big.".to_string()));
    }

    let text = fs::read_to_string(path)?;
    fs::write(path, rewrite_fields(&text, descriptor))?;
    tracing::debug!("Patched {}", path.display());
    Ok(true)
}

/// Replace the project-owned fields in `DESCRIPTION` text.
///
/// Lines are matched by prefix, so continuation lines of a replaced field are
/// kept as they are.
pub fn rewrite_fields(text: &str, descriptor: &PackageDescriptor) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.starts_with("Version:") {
            out.push_str("Version: ");
            out.push_str(&descriptor.version);
        } else if line.starts_with("License:") {
            out.push_str("License:");
            for license in &descriptor.licenses {
                out.push(' ');
                out.push_str(license);
            }
        } else if line.starts_with("Author:") {
            out.push_str("Author:");
            for developer in &descriptor.developers {
                out.push(' ');
                out.push_str(&developer.name);
            }
        } else if let Some(maintainer) = line
            .starts_with("Maintainer:")
            .then(|| descriptor.developers.first())
            .flatten()
        {
            out.push_str("Maintainer: ");
            out.push_str(&maintainer.name);
            if let Some(email) = &maintainer.email {
                out.push_str(" <");
                out.push_str(email);
                out.push('>');
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}
