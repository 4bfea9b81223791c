//! Top-level acquisition flow: destination check, cache restore, then the
//! full download → decompress → extract → copy path.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::download::{
    binaries_exist, prepare_destination, unpack, verify_sha256, ArchiveFetcher, CacheKey,
    CacheStore, CopyReport, Download, InstallPlan, ScratchWorkspace,
};
use crate::error::Result;
use crate::request::AcquisitionRequest;
use crate::ui::{Phase, Ui};
use crate::version::DEFAULT_ARCHIVE_HOST;

/// How a run reached its result.
#[derive(Debug)]
pub enum Outcome {
    /// The destination already held a complete installation.
    AlreadyPresent,
    /// A complete cache entry was copied into the destination.
    RestoredFromCache { entry: PathBuf },
    /// The archive was downloaded and installed.
    Installed(Installation),
}

#[derive(Debug)]
pub struct Installation {
    pub url: String,
    pub report: CopyReport,
    /// Whether the destination passes the completeness check after copying.
    pub complete: bool,
    pub background: BackgroundTasks,
}

/// Fire-and-forget follow-up work. Tasks log their own failures; `wait`
/// only joins them.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match thread::Builder::new().name(name.to_string()).spawn(task) {
            Ok(handle) => self.handles.push((name, handle)),
            Err(e) => warn!("Failed to start {}: {}", name, e),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Block until every task has finished.
    pub fn wait(self) {
        for (name, handle) in self.handles {
            if handle.join().is_err() {
                warn!("Background task {} panicked", name);
            }
        }
    }
}

/// Drives one acquisition request.
pub struct Acquirer {
    fetcher: ArchiveFetcher,
    cache: Option<CacheStore>,
    archive_host: String,
    expected_sha256: Option<String>,
}

impl Acquirer {
    /// `cache` of `None` disables both the cache restore and the backfill.
    pub fn new(cache: Option<CacheStore>) -> Result<Self> {
        Ok(Self {
            fetcher: ArchiveFetcher::new()?,
            cache,
            archive_host: DEFAULT_ARCHIVE_HOST.to_string(),
            expected_sha256: None,
        })
    }

    pub fn with_archive_host(mut self, host: impl Into<String>) -> Self {
        self.archive_host = host.into();
        self
    }

    /// Keep scratch workspaces under `parent`.
    pub fn with_scratch_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.fetcher = self.fetcher.with_scratch_parent(parent);
        self
    }

    pub fn with_sha256(mut self, digest: Option<String>) -> Self {
        self.expected_sha256 = digest.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn acquire(&self, request: &AcquisitionRequest, ui: &mut impl Ui) -> Result<Outcome> {
        let destination = &request.destination;
        ui.set_phase(Phase::Checking);

        if binaries_exist(destination, request.os) {
            info!(destination = %destination.display(), "Binaries already present");
            return Ok(Outcome::AlreadyPresent);
        }

        let key = request.cache_key();
        if let Some(cache) = &self.cache {
            let entry = cache.entry_dir(&key);
            debug!(entry = %entry.display(), "Checking cache entry");
            if cache.restore_into(&key, destination) {
                info!(entry = %entry.display(), "Restored binaries from cache");
                return Ok(Outcome::RestoredFromCache { entry });
            }
        }

        let url = request.url(&self.archive_host);
        ui.set_info("Cef binaries download started. Depending on your network this may take a while.");
        ui.set_info(format!("From url: {}", url));
        ui.set_info(format!("Destination: {}", destination.display()));
        prepare_destination(destination)?;

        ui.set_phase(Phase::Downloading);
        let download = self.fetcher.fetch(&url, ui)?;

        let report = match self.install(&download, request, ui) {
            Ok(report) => report,
            Err(e) => {
                download.workspace.remove().ok();
                return Err(e);
            }
        };

        let complete = binaries_exist(destination, request.os);
        let background = self.spawn_background(key, destination, download.workspace);

        ui.set_phase(Phase::Complete);
        Ok(Outcome::Installed(Installation {
            url,
            report,
            complete,
            background,
        }))
    }

    fn install(
        &self,
        download: &Download,
        request: &AcquisitionRequest,
        ui: &mut impl Ui,
    ) -> Result<CopyReport> {
        if let Some(expected) = &self.expected_sha256 {
            verify_sha256(&download.archive, expected)?;
            ui.log("Checksum verified");
        }

        let root = unpack(&download.archive, download.workspace.path(), ui)?;

        ui.set_phase(Phase::Copying);
        let plan = InstallPlan::new(&root, &request.destination, request.os);
        let report = plan.execute();
        ui.log(format!("Copied {} of {} files", report.copied, plan.len()));
        Ok(report)
    }

    fn spawn_background(
        &self,
        key: CacheKey,
        destination: &Path,
        workspace: ScratchWorkspace,
    ) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::default();

        if let Some(cache) = self.cache.clone() {
            let source = destination.to_path_buf();
            tasks.spawn("cache-sync", move || sync_cache(&cache, &key, &source));
        }

        tasks.spawn("scratch-cleanup", move || {
            let path = workspace.path().to_path_buf();
            match workspace.remove() {
                Ok(()) => debug!(path = %path.display(), "Removed scratch workspace"),
                Err(e) => warn!("Failed to remove scratch workspace {}: {}", path.display(), e),
            }
        });

        tasks
    }
}

fn sync_cache(cache: &CacheStore, key: &CacheKey, source: &Path) {
    match cache.store_from(key, source) {
        Ok(report) => {
            for failure in &report.failed {
                warn!(path = %failure.path.display(), reason = %failure.reason, "Cache sync skipped file");
            }
            debug!(files = report.copied, entry = %cache.entry_dir(key).display(), "Cache updated");
        }
        Err(e) => warn!("Failed to update cache: {}", e),
    }
}
