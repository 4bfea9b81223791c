use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::download::CacheKey;
use crate::error::{IoContext, Result};
use crate::platform::{self, Arch, Os};
use crate::version::{self, VersionTable};

/// Raw, unresolved option values as they come from the command line.
#[derive(Debug, Default, Clone)]
pub struct RequestArgs {
    pub app_version: Option<String>,
    pub binary_version: Option<String>,
    pub os: Option<String>,
    pub cpu: Option<String>,
    pub dest: Option<String>,
}

/// A fully resolved acquisition request. The destination is always absolute.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRequest {
    pub app_version: Option<String>,
    pub binary_version: String,
    pub os: Os,
    pub arch: Arch,
    pub destination: PathBuf,
}

impl AcquisitionRequest {
    /// Resolve raw arguments against the version table and the current directory.
    pub fn resolve(args: &RequestArgs, table: &VersionTable) -> Result<Self> {
        let cwd = std::env::current_dir().io_context(|| "Failed to read current directory")?;
        Ok(Self::resolve_in(args, table, &cwd))
    }

    /// Same as [`resolve`](Self::resolve) with an explicit working directory.
    pub fn resolve_in(args: &RequestArgs, table: &VersionTable, cwd: &Path) -> Self {
        let (os, arch) = platform::select(args.os.as_deref(), args.cpu.as_deref());
        let binary_version =
            table.resolve(args.app_version.as_deref(), args.binary_version.as_deref());

        Self {
            app_version: args.app_version.clone().filter(|v| !v.trim().is_empty()),
            binary_version,
            os,
            arch,
            destination: normalize_destination(args.dest.as_deref(), cwd),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.binary_version, self.os, self.arch)
    }

    pub fn url(&self, archive_host: &str) -> String {
        version::build_url(archive_host, &self.binary_version, self.os, self.arch)
    }
}

impl fmt::Display for AcquisitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "app version: {}", self.app_version.as_deref().unwrap_or(""))?;
        writeln!(f, "cef binary version: {}", self.binary_version)?;
        writeln!(f, "os: {}", self.os)?;
        writeln!(f, "cpu: {}", self.arch)?;
        write!(f, "destination: {}", self.destination.display())
    }
}

/// Strip quotes and trailing separators, then anchor relative paths at `cwd`.
/// An empty input resolves to `cwd` itself.
pub fn normalize_destination(raw: Option<&str>, cwd: &Path) -> PathBuf {
    let stripped: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect();
    let stripped = stripped.trim();
    let trimmed = stripped.trim_end_matches(['/', '\\']);

    if trimmed.is_empty() {
        if stripped.is_empty() {
            return cwd.to_path_buf();
        }
        // Input was nothing but separators, i.e. the filesystem root.
        return PathBuf::from(MAIN_SEPARATOR.to_string());
    }

    // `C:` alone is drive-relative; keep the separator that made it a root.
    let trimmed = if is_drive_prefix(trimmed) && stripped.len() > trimmed.len() {
        &stripped[..trimmed.len() + 1]
    } else {
        trimmed
    };

    let path = Path::new(trimmed);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn is_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd() -> PathBuf {
        std::env::temp_dir().join("project")
    }

    #[test]
    fn test_relative_destination() {
        assert_eq!(normalize_destination(Some("build"), &cwd()), cwd().join("build"));
    }

    #[test]
    fn test_empty_destination_is_cwd() {
        assert_eq!(normalize_destination(None, &cwd()), cwd());
        assert_eq!(normalize_destination(Some(""), &cwd()), cwd());
        assert_eq!(normalize_destination(Some("\"\""), &cwd()), cwd());
    }

    #[test]
    fn test_absolute_destination_unchanged() {
        let abs = cwd().join("out");
        let raw = abs.to_str().unwrap();
        assert_eq!(normalize_destination(Some(raw), Path::new("/elsewhere")), abs);
    }

    #[test]
    fn test_quotes_and_trailing_separators() {
        let abs = cwd().join("out");
        let quoted = format!("\"{}{}{}\"", abs.display(), MAIN_SEPARATOR, MAIN_SEPARATOR);
        assert_eq!(normalize_destination(Some(&quoted), Path::new("/elsewhere")), abs);
        assert_eq!(normalize_destination(Some("'bin/'"), &cwd()), cwd().join("bin"));
    }

    #[test]
    fn test_drive_root_keeps_separator() {
        assert!(is_drive_prefix("C:"));
        assert!(!is_drive_prefix("C:\\dir"));
        assert!(!is_drive_prefix("1:"));

        let root = normalize_destination(Some("C:\\\\"), &cwd());
        assert!(root.to_string_lossy().ends_with("C:\\"));
        let root = normalize_destination(Some("'C:/'"), &cwd());
        assert!(root.to_string_lossy().ends_with("C:/"));
        // A bare drive prefix stays as typed.
        assert!(normalize_destination(Some("C:"), &cwd()).to_string_lossy().ends_with("C:"));
    }

    #[cfg(windows)]
    #[test]
    fn test_drive_root_is_absolute() {
        assert_eq!(normalize_destination(Some("C:\\"), &cwd()), PathBuf::from("C:\\"));
        assert_eq!(normalize_destination(Some("D:/"), &cwd()), PathBuf::from("D:/"));
    }

    #[test]
    fn test_resolve_in() {
        let args = RequestArgs {
            app_version: Some("v65".into()),
            os: Some("win".into()),
            cpu: Some("x64".into()),
            dest: Some("out".into()),
            ..Default::default()
        };
        let request = AcquisitionRequest::resolve_in(&args, VersionTable::builtin(), &cwd());

        assert_eq!(request.binary_version, "3.3325.1751.ge5b78a5");
        assert_eq!(request.os, Os::Windows);
        assert_eq!(request.arch, Arch::X64);
        assert_eq!(request.destination, cwd().join("out"));
        assert_eq!(request.cache_key().folder_name(), "3.3325.1751.ge5b78a5_windows64");
        assert!(request
            .url("http://host")
            .ends_with("cef_binary_3.3325.1751.ge5b78a5_windows64_client.tar.bz2"));
    }
}
