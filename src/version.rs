//! Mapping from application version tags to CEF binary distribution versions.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, IoContext, Result};
use crate::platform::{Arch, Os};

pub const DEFAULT_ARCHIVE_HOST: &str = "http://opensource.spotify.com/cefbuilds";

/// Version used when a tag is unknown or empty.
const FALLBACK_VERSION: &str = "3.3359.1772.gd1df190";

const BUILTIN_VERSIONS: &[(&str, &str)] = &[
    ("v70", "3.3538.1849.g458cc98"),
    ("v68", "3.3440.1805.gbe070f9"),
    ("v66", "3.3359.1772.gd1df190"),
    ("v65", "3.3325.1751.ge5b78a5"),
    ("v64", "3.3282.1741.gcd94615"),
    ("v63", "3.3239.1723.g071d1c1"),
    ("v59", "3.3071.1646.gbb29707"),
];

static BUILTIN: Lazy<VersionTable> = Lazy::new(|| VersionTable {
    versions: BUILTIN_VERSIONS
        .iter()
        .map(|(tag, version)| (tag.to_string(), version.to_string()))
        .collect(),
    fallback: FALLBACK_VERSION.to_string(),
});

/// On-disk format of a version map file.
#[derive(Debug, Deserialize)]
struct VersionMapFile {
    #[serde(default)]
    default: Option<String>,
    #[serde(flatten)]
    versions: HashMap<String, String>,
}

/// Immutable tag -> binary version table with a fallback entry.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionTable {
    versions: HashMap<String, String>,
    fallback: String,
}

impl VersionTable {
    /// The built-in table.
    pub fn builtin() -> &'static VersionTable {
        &BUILTIN
    }

    /// Built-in table extended with the entries of a JSON version map.
    /// Entries in the file override built-in tags with the same name.
    pub fn with_overrides(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .io_context(|| format!("Failed to read version map {:?}", path))?;
        let file: VersionMapFile = serde_json::from_str(&text).map_err(|source| Error::VersionMap {
            path: path.to_path_buf(),
            source,
        })?;

        let mut table = Self::builtin().clone();
        table.versions.extend(file.versions);
        if let Some(fallback) = file.default {
            table.fallback = fallback;
        }
        Ok(table)
    }

    /// Look up a tag, falling back to the default entry for unknown tags.
    pub fn lookup(&self, app_version: &str) -> &str {
        self.versions
            .get(app_version.trim())
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    /// Resolve the binary version. A non-empty override always wins.
    pub fn resolve(&self, app_version: Option<&str>, binary_override: Option<&str>) -> String {
        match binary_override.map(str::trim) {
            Some(version) if !version.is_empty() => version.to_string(),
            _ => self.lookup(app_version.unwrap_or_default()).to_string(),
        }
    }
}

/// File name of the client distribution archive.
pub fn archive_name(binary_version: &str, os: Os, arch: Arch) -> String {
    format!(
        "cef_binary_{}_{}{}_client.tar.bz2",
        binary_version,
        os.as_str(),
        arch.bits()
    )
}

/// Full download URL of the client distribution archive.
pub fn build_url(archive_host: &str, binary_version: &str, os: Os, arch: Arch) -> String {
    format!(
        "{}/{}",
        archive_host.trim_end_matches('/'),
        archive_name(binary_version, os, arch)
    )
}
