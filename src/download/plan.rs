use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::cache::{CopyReport, CORE_LIBRARIES, LOCALES_DIR};
use crate::error::{IoContext, Result};
use crate::platform::Os;

const RELEASE_DIR: &str = "Release";

/// Unicode data and V8 snapshot files.
const RUNTIME_DATA: &[&str] = &[
    "icudtl.dat",
    "natives_blob.bin",
    "snapshot_blob.bin",
    "v8_context_snapshot.bin",
];

/// Crashpad loader and content decryption adapter.
const WINDOWS_EXTRAS: &[&str] = &["chrome_elf.dll", "widevinecdmadapter.dll"];

const RESOURCE_PACKS: &[&str] = &[
    "devtools_resources.pak",
    "cef.pak",
    "cef_extensions.pak",
    "cef_100_percent.pak",
    "cef_200_percent.pak",
];

/// Files taken from the distribution root rather than `Release`.
const DOCUMENTS: &[&str] = &["LICENSE.txt", "README.txt"];

const LOCALE_FILES: &[&str] = &["en-US.pak", "en-US.pak.info"];

#[derive(Debug, Clone, PartialEq)]
pub struct CopyStep {
    pub from: PathBuf,
    pub to: PathBuf,
}

impl CopyStep {
    fn new(from_dir: &Path, to_dir: &Path, name: &str) -> Self {
        Self {
            from: from_dir.join(name),
            to: to_dir.join(name),
        }
    }
}

/// Fixed list of files copied from an extracted distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallPlan {
    steps: Vec<CopyStep>,
}

impl InstallPlan {
    /// Build the plan. Performs no I/O.
    pub fn new(extracted_root: &Path, destination: &Path, os: Os) -> Self {
        let release = extracted_root.join(RELEASE_DIR);
        let release_locales = release.join(LOCALES_DIR);
        let dest_locales = destination.join(LOCALES_DIR);

        let mut steps: Vec<CopyStep> = CORE_LIBRARIES
            .iter()
            .map(|lib| CopyStep::new(&release, destination, &format!("{}{}", lib, os.lib_extension())))
            .collect();

        steps.extend(
            RUNTIME_DATA
                .iter()
                .map(|name| CopyStep::new(&release, destination, name)),
        );

        if os.is_windows() {
            steps.extend(
                WINDOWS_EXTRAS
                    .iter()
                    .map(|name| CopyStep::new(&release, destination, name)),
            );
        }

        steps.extend(
            RESOURCE_PACKS
                .iter()
                .map(|name| CopyStep::new(&release, destination, name)),
        );
        steps.extend(
            DOCUMENTS
                .iter()
                .map(|name| CopyStep::new(extracted_root, destination, name)),
        );
        steps.extend(
            LOCALE_FILES
                .iter()
                .map(|name| CopyStep::new(&release_locales, &dest_locales, name)),
        );

        Self { steps }
    }

    pub fn steps(&self) -> &[CopyStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Copy every step, overwriting existing files. Failures are collected,
    /// not propagated. Destination directories must already exist.
    pub fn execute(&self) -> CopyReport {
        let mut report = CopyReport::default();

        for step in &self.steps {
            match fs::copy(&step.from, &step.to) {
                Ok(_) => report.copied += 1,
                Err(e) => {
                    warn!(from = %step.from.display(), "Failed to copy: {}", e);
                    report.failed.push(super::cache::CopyFailure {
                        path: step.from.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// Create the destination folder and its `locales` subfolder.
pub fn prepare_destination(destination: &Path) -> Result<()> {
    let locales = destination.join(LOCALES_DIR);
    fs::create_dir_all(&locales)
        .io_context(|| format!("Failed to create destination {:?}", locales))
}
