use crate::errors::BuildError;
use log::trace;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One declared third-party package, optionally pinned to an exact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
}

fn valid_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '[' | ']'))
}

/// Parses a requirements-style dependency manifest. Blank lines and `#`
/// comments are skipped; every remaining line must be `name` or
/// `name==version`. The manifest must exist before any install step runs.
pub fn load_manifest(path: &Path) -> Result<Vec<Dependency>, BuildError> {
    let file = File::open(path).map_err(|_| BuildError::ManifestMissing {
        path: path.to_path_buf(),
    })?;
    let reader = BufReader::new(file);
    let mut dependencies = Vec::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, version) = match line.split_once("==") {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (line, None),
        };

        if !valid_package_name(name) {
            return Err(BuildError::ManifestMalformed {
                path: path.to_path_buf(),
                reason: format!("invalid package name '{}' on line {}", name, lineno + 1),
            });
        }
        if let Some(version) = version {
            if version.is_empty() {
                return Err(BuildError::ManifestMalformed {
                    path: path.to_path_buf(),
                    reason: format!("empty version pin on line {}", lineno + 1),
                });
            }
        }

        trace!("Parsed dependency: {} ({:?})", name, version);
        dependencies.push(Dependency {
            name: name.to_string(),
            version: version.map(|v| v.to_string()),
        });
    }

    Ok(dependencies)
}
