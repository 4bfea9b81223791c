use bzip2::read::MultiBzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

use crate::error::{Error, IoContext, Result};
use crate::ui::{Phase, Ui};

const ARCHIVE_SUFFIX: &str = ".tar.bz2";

/// Decompress a bzip2 file into a plain tar file.
///
/// Both files are closed on every exit path; the output is flushed before
/// returning success.
pub fn decompress(compressed: &Path, tar_path: &Path) -> Result<()> {
    let input = File::open(compressed)
        .io_context(|| format!("Failed to open archive {:?}", compressed))?;
    let output = File::create(tar_path)
        .io_context(|| format!("Failed to create {:?}", tar_path))?;

    let mut decoder = MultiBzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(output);

    let to_error = |source: io::Error| Error::Decompress {
        path: compressed.to_path_buf(),
        source,
    };
    let bytes = io::copy(&mut decoder, &mut writer).map_err(to_error)?;
    writer.flush().map_err(to_error)?;

    debug!(bytes, "Decompressed {:?}", compressed);
    Ok(())
}

/// Unpack every entry of a tar file under `target_dir`, preserving paths.
/// Returns the number of entries written.
pub fn extract(tar_path: &Path, target_dir: &Path, ui: &mut impl Ui) -> Result<u64> {
    let file =
        File::open(tar_path).io_context(|| format!("Failed to open tar file {:?}", tar_path))?;
    fs::create_dir_all(target_dir).io_context(|| "Failed to create destination directory")?;

    let to_error = |source: io::Error| Error::Extract {
        path: tar_path.to_path_buf(),
        source,
    };

    let mut archive = Archive::new(BufReader::new(file));
    let mut count: u64 = 0;

    for entry in archive.entries().map_err(to_error)? {
        let mut entry = entry.map_err(to_error)?;
        let unpacked = entry.unpack_in(target_dir).map_err(to_error)?;
        if !unpacked {
            let path = entry.path().map(|p| p.into_owned()).unwrap_or_default();
            warn!("Skipped archive entry outside of target: {:?}", path);
            continue;
        }

        count += 1;
        if count % 64 == 0 {
            ui.set_progress(count, 0, format!("{} entries", count));
        }
    }

    ui.clear_progress();
    ui.log(format!("Extracted {} entries", count));
    Ok(count)
}

/// Name of the top-level folder inside a distribution archive.
pub fn unpacked_folder_name(archive_name: &str) -> &str {
    archive_name
        .strip_suffix(ARCHIVE_SUFFIX)
        .unwrap_or(archive_name)
}

/// Locate the distribution root inside `extract_dir`.
///
/// Prefers the folder named after the archive; otherwise accepts a single
/// top-level directory.
pub fn find_extracted_root(extract_dir: &Path, archive_name: &str) -> Result<PathBuf> {
    let expected = extract_dir.join(unpacked_folder_name(archive_name));
    if expected.is_dir() {
        return Ok(expected);
    }

    let dirs: Vec<PathBuf> = fs::read_dir(extract_dir)
        .io_context(|| format!("Failed to read {:?}", extract_dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    match dirs.as_slice() {
        [only] => Ok(only.clone()),
        _ => Ok(expected),
    }
}

/// Decompress then extract `archive` inside `workspace`, returning the
/// distribution root folder.
pub fn unpack(archive: &Path, workspace: &Path, ui: &mut impl Ui) -> Result<PathBuf> {
    let archive_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(ARCHIVE_SUFFIX);
    let tar_path = workspace.join(format!("{}.tar", unpacked_folder_name(archive_name)));
    let extract_dir = workspace.join("extracted");

    ui.set_phase(Phase::Decompressing);
    decompress(archive, &tar_path)?;

    ui.set_phase(Phase::Extracting);
    extract(&tar_path, &extract_dir, ui)?;

    find_extracted_root(&extract_dir, archive_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::SilentUi;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use tempfile::TempDir;

    fn write_tar_bz2(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = BzEncoder::new(file, Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_unpacked_folder_name() {
        assert_eq!(
            unpacked_folder_name("cef_binary_1.0_linux64_client.tar.bz2"),
            "cef_binary_1.0_linux64_client"
        );
        assert_eq!(unpacked_folder_name("other.zip"), "other.zip");
    }

    #[test]
    fn test_unpack_preserves_paths() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("cef_binary_1.0_linux64_client.tar.bz2");
        write_tar_bz2(
            &archive,
            &[
                ("cef_binary_1.0_linux64_client/README.txt", b"readme"),
                ("cef_binary_1.0_linux64_client/Release/libcef.so", b"lib"),
                ("cef_binary_1.0_linux64_client/Release/locales/en-US.pak", b"pak"),
            ],
        );

        let root = unpack(&archive, dir.path(), &mut SilentUi::new()).unwrap();
        assert!(root.ends_with("cef_binary_1.0_linux64_client"));
        assert_eq!(fs::read(root.join("Release/libcef.so")).unwrap(), b"lib");
        assert_eq!(fs::read(root.join("Release/locales/en-US.pak")).unwrap(), b"pak");
        assert!(dir.path().join("cef_binary_1.0_linux64_client.tar").is_file());
    }

    #[test]
    fn test_single_top_level_dir_is_used() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("renamed.tar.bz2");
        write_tar_bz2(&archive, &[("actual_root/Release/icudtl.dat", b"icu")]);

        let root = unpack(&archive, dir.path(), &mut SilentUi::new()).unwrap();
        assert!(root.ends_with("actual_root"));
    }

    #[test]
    fn test_corrupt_archive_is_fatal() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.tar.bz2");
        fs::write(&archive, b"definitely not bzip2").unwrap();

        let err = decompress(&archive, &dir.path().join("broken.tar")).unwrap_err();
        assert!(matches!(err, Error::Decompress { .. }));
    }

    #[test]
    fn test_truncated_tar_is_fatal() {
        let dir = TempDir::new().unwrap();
        let tar_path = dir.path().join("short.tar");
        fs::write(&tar_path, vec![1u8; 100]).unwrap();

        let err = extract(&tar_path, &dir.path().join("out"), &mut SilentUi::new()).unwrap_err();
        assert!(matches!(err, Error::Extract { .. }));
    }
}
