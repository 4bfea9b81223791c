use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, IoContext, Result};
use crate::ui::Ui;

const USER_AGENT: &str = concat!("cef-fetch/", env!("CARGO_PKG_VERSION"));

/// A uniquely named temporary directory for one download-and-extract run.
#[derive(Debug)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    /// Create a fresh, uniquely named workspace under `parent`.
    pub fn create_in(parent: &Path) -> Result<Self> {
        let root = parent.join(format!("cef-fetch-{}", Uuid::new_v4()));
        fs::create_dir_all(&root)
            .io_context(|| format!("Failed to create scratch directory {:?}", root))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Recursively delete the workspace.
    pub fn remove(self) -> std::io::Result<()> {
        fs::remove_dir_all(&self.root)
    }
}

/// A downloaded archive and the workspace holding it.
#[derive(Debug)]
pub struct Download {
    pub workspace: ScratchWorkspace,
    pub archive: PathBuf,
}

/// Blocking HTTP fetcher for distribution archives.
pub struct ArchiveFetcher {
    client: Client,
    scratch_parent: PathBuf,
}

impl ArchiveFetcher {
    pub fn new() -> Result<Self> {
        // Archives are large; no overall request timeout.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            client,
            scratch_parent: std::env::temp_dir(),
        })
    }

    /// Create scratch workspaces under `parent` instead of the system temp directory.
    pub fn with_scratch_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.scratch_parent = parent.into();
        self
    }

    /// Download `url` into a new scratch workspace.
    pub fn fetch(&self, url: &str, ui: &mut impl Ui) -> Result<Download> {
        let workspace = ScratchWorkspace::create_in(&self.scratch_parent)?;
        let archive = workspace.path().join(archive_file_name(url));

        match self.download_to(url, &archive, ui) {
            Ok(()) => Ok(Download { workspace, archive }),
            Err(e) => {
                workspace.remove().ok();
                Err(e)
            }
        }
    }

    /// Download `url` to `dest`, reporting progress.
    pub fn download_to(&self, url: &str, dest: &Path, ui: &mut impl Ui) -> Result<()> {
        info!(url, "Starting download");
        let response = self.client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);

        let file = File::create(dest)
            .io_context(|| format!("Failed to create destination file {:?}", dest))?;
        let mut file = BufWriter::new(file);

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; 64 * 1024];
        let mut reader = response;

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .io_context(|| "Failed to read from response")?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read])
                .io_context(|| "Failed to write to file")?;

            downloaded += bytes_read as u64;
            ui.set_progress(downloaded, total_size, format_bytes(downloaded, total_size));
        }

        file.flush().io_context(|| "Failed to write to file")?;
        ui.clear_progress();
        debug!(bytes = downloaded, "Download complete");
        ui.log("Download complete");
        Ok(())
    }
}

/// Last path segment of a URL, used as the local archive name.
pub fn archive_file_name(url: &str) -> &str {
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("archive.tar.bz2")
}

/// Compare the SHA-256 digest of `path` against a hex string (case-insensitive).
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let mut file =
        File::open(path).io_context(|| format!("Failed to open {:?} for hashing", path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .io_context(|| format!("Failed to hash {:?}", path))?;
    let actual = hex::encode(hasher.finalize());

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}

/// Format bytes as human-readable string
fn format_bytes(current: u64, total: u64) -> String {
    fn fmt(bytes: u64) -> String {
        if bytes >= 1_000_000_000 {
            format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
        } else if bytes >= 1_000_000 {
            format!("{:.1} MB", bytes as f64 / 1_000_000.0)
        } else if bytes >= 1_000 {
            format!("{:.1} KB", bytes as f64 / 1_000.0)
        } else {
            format!("{} B", bytes)
        }
    }
    if total == 0 {
        fmt(current)
    } else {
        format!("{} / {}", fmt(current), fmt(total))
    }
}
