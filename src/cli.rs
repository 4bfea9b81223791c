use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::request::RequestArgs;
use crate::version::DEFAULT_ARCHIVE_HOST;

pub const ABOUT: &str = "Downloads CEF binary distributions, unpacks them and copies the files \
a CEF application needs to the given location or the current directory.";

#[derive(Parser, Debug)]
#[command(name = "cef-fetch")]
#[command(version, about = ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download (if needed) and install CEF binaries
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Application version tag, e.g. "v65"
    pub app_version: Option<String>,

    /// CEF binary version, e.g. "3.3325.1751.ge5b78a5". Overrides the app version
    #[arg(short = 'v', long)]
    pub cef_binary_version: Option<String>,

    /// Target operating system: "win" or "linux". Defaults to the current system
    #[arg(short, long)]
    pub os: Option<String>,

    /// Target cpu: "x86", "x64" or "any". Defaults to the current system
    #[arg(short, long)]
    pub cpu: Option<String>,

    /// Destination of the binaries, relative or absolute. Defaults to the current directory
    #[arg(short, long)]
    pub dest: Option<String>,

    /// Custom cache directory
    #[arg(long, env = "CEF_FETCH_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of the archive host
    #[arg(long, env = "CEF_FETCH_ARCHIVE_HOST", default_value = DEFAULT_ARCHIVE_HOST)]
    pub archive_host: String,

    /// JSON file extending the app version to binary version table
    #[arg(long, env = "CEF_FETCH_VERSION_MAP")]
    pub version_map: Option<PathBuf>,

    /// Expected SHA-256 of the downloaded archive
    #[arg(long)]
    pub sha256: Option<String>,

    /// Neither read from nor write to the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

impl DownloadArgs {
    pub fn request_args(&self) -> RequestArgs {
        RequestArgs {
            app_version: self.app_version.clone(),
            binary_version: self.cef_binary_version.clone(),
            os: self.os.clone(),
            cpu: self.cpu.clone(),
            dest: self.dest.clone(),
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Guidance printed when no subcommand is given.
pub fn usage() -> String {
    format!(
        "Missing command.\n\
         To run you need the \"download\" command.\n\
         For more help type:\n\n    cef-fetch download -h\n\n{}\n\n\
         Note that depending on your network, downloading can take a while.",
        ABOUT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "cef-fetch", "download", "v65", "-v", "3.3325.1751.ge5b78a5", "--os", "win", "--cpu",
            "x64", "--dest", "out",
        ])
        .unwrap();

        let Some(Commands::Download(args)) = cli.command else {
            panic!("expected download command");
        };
        let request = args.request_args();
        assert_eq!(request.app_version.as_deref(), Some("v65"));
        assert_eq!(request.binary_version.as_deref(), Some("3.3325.1751.ge5b78a5"));
        assert_eq!(request.os.as_deref(), Some("win"));
        assert_eq!(request.cpu.as_deref(), Some("x64"));
        assert_eq!(request.dest.as_deref(), Some("out"));
        assert!(!args.no_cache);
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::try_parse_from(["cef-fetch"]).unwrap();
        assert!(cli.command.is_none());
        assert!(usage().contains("download"));
    }
}
