use directories::ProjectDirs;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::platform::{Arch, Os};

/// Namespace folder under the cache root.
const CACHE_NAMESPACE: &str = "CEF";

/// Number of parent directories climbed from the executable's folder.
const EXE_PARENT_LEVELS: usize = 2;

/// Payload files every complete installation carries, independent of OS.
const REQUIRED_PAYLOAD: &[&str] = &[
    "cef_100_percent.pak",
    "cef_200_percent.pak",
    "cef_extensions.pak",
    "devtools_resources.pak",
    "icudtl.dat",
    "natives_blob.bin",
    "snapshot_blob.bin",
    "v8_context_snapshot.bin",
];

/// Shared libraries, without extension.
pub(crate) const CORE_LIBRARIES: &[&str] = &["libcef", "libEGL", "libGLESv2"];

pub const LOCALES_DIR: &str = "locales";

/// The set of file names whose presence defines a complete installation.
pub fn required_files(os: Os) -> Vec<String> {
    REQUIRED_PAYLOAD
        .iter()
        .map(|name| name.to_string())
        .chain(
            CORE_LIBRARIES
                .iter()
                .map(|lib| format!("{}{}", lib, os.lib_extension())),
        )
        .collect()
}

/// True iff `folder` holds a `locales` subfolder and every required file.
/// Pure presence check: unreadable or partial folders count as absent.
pub fn binaries_exist(folder: &Path, os: Os) -> bool {
    if !folder.is_dir() || !folder.join(LOCALES_DIR).is_dir() {
        return false;
    }

    required_files(os).iter().all(|file| folder.join(file).is_file())
}

/// Identifies a cache entry: `{version}_{os}{bits}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub binary_version: String,
    pub os: Os,
    pub arch: Arch,
}

impl CacheKey {
    pub fn new(binary_version: impl Into<String>, os: Os, arch: Arch) -> Self {
        Self {
            binary_version: binary_version.into(),
            os,
            arch,
        }
    }

    pub fn folder_name(&self) -> String {
        format!("{}_{}{}", self.binary_version, self.os, self.arch.bits())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.folder_name())
    }
}

/// Where the cache lives.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRoot {
    /// Explicit directory from the command line or environment.
    Explicit(PathBuf),
    /// `CEF/` next to the install location of the running executable.
    ExecutableRelative,
    /// `CEF/` under the platform cache directory.
    UserCache,
}

impl CacheRoot {
    /// Explicit directory if given, executable-relative otherwise.
    pub fn from_option(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => CacheRoot::Explicit(dir),
            None => CacheRoot::ExecutableRelative,
        }
    }

    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            CacheRoot::Explicit(dir) => Ok(dir.clone()),
            CacheRoot::ExecutableRelative => match executable_cache_root() {
                Some(root) => Ok(root),
                None => CacheRoot::UserCache.resolve(),
            },
            CacheRoot::UserCache => {
                let proj_dirs = ProjectDirs::from("", "", "cef-fetch").ok_or_else(|| {
                    Error::CacheRoot("no home directory for the current user".to_string())
                })?;
                Ok(proj_dirs.cache_dir().join(CACHE_NAMESPACE))
            }
        }
    }
}

/// Climb from the executable's folder, stopping early at a missing parent.
fn executable_cache_root() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let mut folder = exe.parent()?.to_path_buf();

    for _ in 0..EXE_PARENT_LEVELS {
        match folder.parent() {
            Some(parent) if parent.is_dir() => folder = parent.to_path_buf(),
            _ => break,
        }
    }

    Some(folder.join(CACHE_NAMESPACE))
}

/// A file or directory that could not be copied.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a best-effort tree copy.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CopyReport {
    pub copied: usize,
    pub failed: Vec<CopyFailure>,
}

impl CopyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, path: &Path, reason: impl fmt::Display) {
        self.failed.push(CopyFailure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }
}

/// Recursively mirror `source` into `dest`, overwriting existing files.
///
/// A missing source directory is an error; individual entries that fail to
/// copy are recorded in the report and the walk continues. When `dest` lies
/// inside `source` it is left out of the walk.
pub fn copy_all(source: &Path, dest: &Path) -> Result<CopyReport> {
    copy_all_except(source, dest, &[])
}

/// Like [`copy_all`], but also leaves every path in `excluded` (and anything
/// below it) out of the mirror.
pub fn copy_all_except(source: &Path, dest: &Path, excluded: &[&Path]) -> Result<CopyReport> {
    if !source.is_dir() {
        return Err(Error::SourceMissing(source.to_path_buf()));
    }

    let mut report = CopyReport::default();
    if let Err(e) = fs::create_dir_all(dest) {
        report.fail(dest, e);
        return Ok(report);
    }

    // Compare canonical forms so `dest` is found however it was spelled.
    let source = canonical(source);
    let pruned: Vec<PathBuf> = std::iter::once(dest)
        .chain(excluded.iter().copied())
        .map(canonical)
        .collect();

    let walker = WalkDir::new(&source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !pruned.iter().any(|p| p == entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(source.as_path()).to_path_buf();
                report.fail(&path, e);
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(&source) else {
            continue;
        };
        let target = dest.join(relative);

        let result = if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };

        match result {
            Ok(()) if entry.file_type().is_file() => report.copied += 1,
            Ok(()) => {}
            Err(e) => report.fail(entry.path(), e),
        }
    }

    Ok(report)
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Version/platform keyed store of previously installed binaries.
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    pub fn new(root: &CacheRoot) -> Result<Self> {
        Ok(Self {
            cache_dir: root.resolve()?,
        })
    }

    pub fn at(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Get path to the entry folder for a key
    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.folder_name())
    }

    /// Check if a complete entry is cached for the key
    pub fn is_cached(&self, key: &CacheKey) -> bool {
        binaries_exist(&self.entry_dir(key), key.os)
    }

    /// Copy a complete cache entry into `destination`.
    ///
    /// Returns true only if the entry was complete and `destination` is
    /// complete after the copy.
    pub fn restore_into(&self, key: &CacheKey, destination: &Path) -> bool {
        let entry = self.entry_dir(key);
        if !binaries_exist(&entry, key.os) {
            debug!(entry = %entry.display(), "No complete cache entry");
            return false;
        }

        match copy_all(&entry, destination) {
            Ok(report) => {
                for failure in &report.failed {
                    warn!(path = %failure.path.display(), reason = %failure.reason, "Failed to copy from cache");
                }
            }
            Err(e) => {
                warn!("Failed to copy cache entry {}: {}", entry.display(), e);
                return false;
            }
        }

        binaries_exist(destination, key.os)
    }

    /// Mirror an installed folder back into the entry for `key`.
    ///
    /// The cache folder itself is skipped when it sits inside `source`.
    pub fn store_from(&self, key: &CacheKey, source: &Path) -> Result<CopyReport> {
        copy_all_except(source, &self.entry_dir(key), &[&self.cache_dir])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Populate `folder` with every required file for `os`.
    pub(crate) fn populate(folder: &Path, os: Os) {
        fs::create_dir_all(folder.join(LOCALES_DIR)).unwrap();
        fs::write(folder.join(LOCALES_DIR).join("en-US.pak"), b"locale").unwrap();
        for file in required_files(os) {
            fs::write(folder.join(&file), file.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_required_files_per_os() {
        let windows = required_files(Os::Windows);
        let linux = required_files(Os::Linux);
        assert_eq!(windows.len(), 11);
        assert_eq!(linux.len(), 11);
        for lib in ["libcef.dll", "libEGL.dll", "libGLESv2.dll"] {
            assert!(windows.iter().any(|f| f == lib));
        }
        for lib in ["libcef.so", "libEGL.so", "libGLESv2.so"] {
            assert!(linux.iter().any(|f| f == lib));
        }
    }

    #[test]
    fn test_binaries_exist_flips_on_any_missing_file() {
        let dir = TempDir::new().unwrap();
        populate(dir.path(), Os::Linux);
        assert!(binaries_exist(dir.path(), Os::Linux));
        assert!(!binaries_exist(dir.path(), Os::Windows));

        for file in required_files(Os::Linux) {
            let path = dir.path().join(&file);
            fs::remove_file(&path).unwrap();
            assert!(!binaries_exist(dir.path(), Os::Linux), "{} missing", file);
            fs::write(&path, b"x").unwrap();
        }
    }

    #[test]
    fn test_binaries_exist_requires_locales() {
        let dir = TempDir::new().unwrap();
        populate(dir.path(), Os::Windows);
        fs::remove_dir_all(dir.path().join(LOCALES_DIR)).unwrap();
        assert!(!binaries_exist(dir.path(), Os::Windows));
        assert!(!binaries_exist(&dir.path().join("missing"), Os::Windows));
    }

    #[test]
    fn test_copy_all_mirrors_and_overwrites() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("a/b")).unwrap();
        fs::write(src.path().join("top.txt"), b"new").unwrap();
        fs::write(src.path().join("a/b/deep.txt"), b"deep").unwrap();
        fs::write(dst.path().join("top.txt"), b"old").unwrap();

        let report = copy_all(src.path(), &dst.path().join("out")).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.copied, 2);
        assert_eq!(fs::read(dst.path().join("out/a/b/deep.txt")).unwrap(), b"deep");

        copy_all(src.path(), dst.path()).unwrap();
        assert_eq!(fs::read(dst.path().join("top.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_copy_all_skips_dest_inside_source() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("libcef.so"), b"lib").unwrap();
        let dest = src.path().join("mirror");

        let report = copy_all(src.path(), &dest).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.copied, 1);
        assert_eq!(fs::read(dest.join("libcef.so")).unwrap(), b"lib");
        assert!(!dest.join("mirror").exists());
    }

    #[test]
    fn test_store_from_skips_cache_inside_source() {
        let project = TempDir::new().unwrap();
        fs::write(project.path().join("libcef.so"), b"lib").unwrap();
        let store = CacheStore::at(project.path().join(CACHE_NAMESPACE));
        let other = CacheKey::new("1.0", Os::Linux, Arch::X86);
        populate(&store.entry_dir(&other), Os::Linux);

        let key = CacheKey::new("3.3359.1772.gd1df190", Os::Linux, Arch::X64);
        let report = store.store_from(&key, project.path()).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.copied, 1);
        let entry = store.entry_dir(&key);
        assert!(entry.join("libcef.so").is_file());
        assert!(!entry.join(CACHE_NAMESPACE).exists());
    }

    #[test]
    fn test_copy_all_missing_source() {
        let dst = TempDir::new().unwrap();
        let err = copy_all(&dst.path().join("nope"), dst.path()).unwrap_err();
        assert!(matches!(err, Error::SourceMissing(_)));
    }

    #[test]
    fn test_restore_into() {
        let cache = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let store = CacheStore::at(cache.path());
        let key = CacheKey::new("3.3325.1751.ge5b78a5", Os::Windows, Arch::X64);

        assert!(!store.restore_into(&key, dest.path()));

        populate(&store.entry_dir(&key), Os::Windows);
        assert!(store.is_cached(&key));
        assert!(store.restore_into(&key, dest.path()));
        assert!(binaries_exist(dest.path(), Os::Windows));
    }

    #[test]
    fn test_incomplete_entry_is_not_restored() {
        let cache = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let store = CacheStore::at(cache.path());
        let key = CacheKey::new("1.0", Os::Linux, Arch::X86);
        let entry = store.entry_dir(&key);
        populate(&entry, Os::Linux);
        fs::remove_file(entry.join("libcef.so")).unwrap();

        assert!(!store.restore_into(&key, dest.path()));
        assert!(!dest.path().join("icudtl.dat").exists());
    }

    #[test]
    fn test_key_folder_name() {
        let key = CacheKey::new("3.3359.1772.gd1df190", Os::Linux, Arch::X86);
        assert_eq!(key.folder_name(), "3.3359.1772.gd1df190_linux32");
    }

    #[test]
    fn test_explicit_cache_root() {
        let root = CacheRoot::from_option(Some(PathBuf::from("/tmp/cef-cache")));
        assert_eq!(root.resolve().unwrap(), PathBuf::from("/tmp/cef-cache"));
        assert!(CacheRoot::ExecutableRelative
            .resolve()
            .unwrap()
            .ends_with(CACHE_NAMESPACE));
    }
}
