use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download of {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decompress {path:?}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to extract {path:?}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Invalid version map {path:?}: {source}")]
    VersionMap {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Source directory does not exist or could not be found: {0:?}")]
    SourceMissing(PathBuf),

    #[error("Could not determine cache directory: {0}")]
    CacheRoot(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a human-readable context to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: f().into(),
            source,
        })
    }
}
