//! Zip archive unpacking

use crate::error::{IngestError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

/// Extract every file entry whose name ends with `suffix` into `dest_dir`.
///
/// Entry paths are kept relative to `dest_dir`; directories and entries
/// with names escaping `dest_dir` are skipped. Returned paths follow archive
/// order, so the first element is the first matching entry.
#[instrument(skip_all, fields(archive = %archive.as_ref().display(), suffix = %suffix))]
pub fn unpack(
    archive: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    suffix: &str,
) -> Result<Vec<PathBuf>> {
    let archive = archive.as_ref();
    let dest_dir = dest_dir.as_ref();

    if !archive.is_file() {
        return Err(IngestError::NotFound(archive.to_path_buf()));
    }

    let corrupt = |e: zip::result::ZipError| IngestError::CorruptArchive {
        path: archive.to_path_buf(),
        message: e.to_string(),
    };

    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;
    debug!(entries = zip.len(), "Opened archive");

    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(corrupt)?;

        if entry.is_dir() || !entry.name().ends_with(suffix) {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "Skipping entry with unsafe path");
            continue;
        };

        let out_path = dest_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)?;
        let bytes = match copy_entry(&mut entry, &mut out) {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(out);
                let _ = fs::remove_file(&out_path);
                return Err(e.into_error(archive, entry.name()));
            },
        };
        debug!(path = %out_path.display(), bytes, "Extracted entry");

        extracted.push(out_path);
    }

    if extracted.is_empty() {
        return Err(IngestError::NoMatchingEntry {
            path: archive.to_path_buf(),
            suffix: suffix.to_string(),
        });
    }

    info!(count = extracted.len(), dest = %dest_dir.display(), "Unpacked archive");
    Ok(extracted)
}

enum CopyError {
    /// Entry payload could not be read back (bad CRC, truncated deflate stream)
    Read(io::Error),
    Write(io::Error),
}

impl CopyError {
    fn into_error(self, archive: &Path, entry: &str) -> IngestError {
        match self {
            Self::Read(e) => IngestError::CorruptArchive {
                path: archive.to_path_buf(),
                message: format!("entry {}: {}", entry, e),
            },
            Self::Write(e) => IngestError::Io(e),
        }
    }
}

fn copy_entry(entry: &mut impl Read, out: &mut impl Write) -> std::result::Result<u64, CopyError> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        out.write_all(&buf[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
    out.flush().map_err(CopyError::Write)?;
    Ok(total)
}

/// First entry ending in `suffix`, extracted into `dest_dir`
pub fn unpack_first(
    archive: impl AsRef<Path>,
    dest_dir: impl AsRef<Path>,
    suffix: &str,
) -> Result<PathBuf> {
    let archive = archive.as_ref();
    unpack(archive, dest_dir, suffix)?
        .into_iter()
        .next()
        .ok_or_else(|| IngestError::NoMatchingEntry {
            path: archive.to_path_buf(),
            suffix: suffix.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_unpack_only_matching_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");
        write_zip(
            &archive,
            &[
                ("readme.txt", b"ignore me"),
                ("DLTINS_20210117_01of01.xml", b"<Document/>"),
                ("nested/", b""),
                ("nested/second.xml", b"<Other/>"),
            ],
        );

        let out = dir.path().join("extracted");
        let files = unpack(&archive, &out, ".xml").unwrap();

        assert_eq!(
            files,
            vec![
                out.join("DLTINS_20210117_01of01.xml"),
                out.join("nested").join("second.xml"),
            ]
        );
        assert_eq!(fs::read(&files[0]).unwrap(), b"<Document/>");
        assert!(!out.join("readme.txt").exists());
    }

    #[test]
    fn test_unpack_first() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");
        write_zip(&archive, &[("a.xml", b"first"), ("b.xml", b"second")]);

        let first = unpack_first(&archive, dir.path().join("out"), ".xml").unwrap();
        assert_eq!(fs::read(first).unwrap(), b"first");
    }

    #[test]
    fn test_unpack_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack(dir.path().join("missing.zip"), dir.path(), ".xml").unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }

    #[test]
    fn test_unpack_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = unpack(&archive, dir.path().join("out"), ".xml").unwrap_err();
        assert!(matches!(err, IngestError::CorruptArchive { .. }), "{:?}", err);
    }

    #[test]
    fn test_unpack_entry_with_bad_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("damaged.zip");
        let payload = b"<Document><FinInstrm/></Document>";

        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("report.xml", options).unwrap();
        writer.write_all(payload).unwrap();
        writer.finish().unwrap();

        // Flip a payload byte; headers stay intact so only the CRC check fails.
        let mut bytes = fs::read(&archive).unwrap();
        let at = bytes
            .windows(payload.len())
            .position(|w| w == payload)
            .unwrap();
        bytes[at + 11] ^= 0x20;
        fs::write(&archive, bytes).unwrap();

        let out = dir.path().join("out");
        let err = unpack(&archive, &out, ".xml").unwrap_err();
        match err {
            IngestError::CorruptArchive { message, .. } => {
                assert!(message.contains("report.xml"), "{}", message)
            },
            other => panic!("expected CorruptArchive, got {:?}", other),
        }
        assert!(!out.join("report.xml").exists());
    }

    #[test]
    fn test_unpack_without_matching_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive.zip");
        write_zip(&archive, &[("data.csv", b"a,b\n")]);

        let err = unpack(&archive, dir.path().join("out"), ".xml").unwrap_err();
        match err {
            IngestError::NoMatchingEntry { suffix, .. } => assert_eq!(suffix, ".xml"),
            other => panic!("expected NoMatchingEntry, got {:?}", other),
        }
    }
}
