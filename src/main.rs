use anyhow::{Context, Result};
use cef_fetch::{
    cli::{usage, Cli, Commands, DownloadArgs},
    download::{CacheRoot, CacheStore},
    version::VersionTable,
    AcquisitionRequest, Acquirer, ConsoleUi, Outcome, SilentUi, Ui,
};
use std::time::Instant;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for errors that escape the download command.
const FAILURE_EXIT_CODE: i32 = 0xbad;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("{:#}", e);
        std::process::exit(FAILURE_EXIT_CODE);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        None => println!("{}", usage()),
        Some(Commands::Download(args)) => {
            if args.quiet {
                download(args, SilentUi::new())?;
            } else {
                download(args, ConsoleUi::new())?;
            }
        }
    }

    Ok(())
}

fn download(args: DownloadArgs, mut ui: impl Ui) -> Result<()> {
    let start = Instant::now();

    let table = match &args.version_map {
        Some(path) => VersionTable::with_overrides(path)?,
        None => VersionTable::builtin().clone(),
    };
    let request = AcquisitionRequest::resolve(&args.request_args(), &table)?;
    debug!("Resolved request:\n{}", request);

    let cache = if args.no_cache {
        None
    } else {
        match CacheStore::new(&CacheRoot::from_option(args.cache_dir.clone())) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Cache disabled: {}", e);
                None
            }
        }
    };

    let acquirer = Acquirer::new(cache)
        .context("Failed to create HTTP client")?
        .with_archive_host(args.archive_host.clone())
        .with_sha256(args.sha256.clone());

    match acquirer.acquire(&request, &mut ui) {
        Ok(Outcome::AlreadyPresent) => println!("Cef binaries exist!"),
        Ok(Outcome::RestoredFromCache { entry }) => {
            println!("Cef binaries copied from {}!", entry.display())
        }
        Ok(Outcome::Installed(installation)) => {
            for failure in &installation.report.failed {
                eprintln!(
                    "Failed to copy {}: {}",
                    failure.path.display(),
                    failure.reason
                );
            }
            if installation.complete {
                println!("Cef binaries download completed successfully.");
            } else {
                println!("Cef binaries download completed, but the installation is incomplete.");
            }
            println!("Time elapsed: {:.1}s", start.elapsed().as_secs_f64());
            installation.background.wait();
        }
        Err(e) => {
            // Reported, but not treated as a process failure.
            eprintln!("{}", e);
            println!("Cef binaries download completed with error.");
            println!("Time elapsed: {:.1}s", start.elapsed().as_secs_f64());
        }
    }

    Ok(())
}
