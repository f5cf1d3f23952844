//! Packs a finished working directory into a single ZIP archive.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::layout::SIDECAR_FILE;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write archive entry '{entry}': {source}")]
    Zip {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// A packed archive and its content checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    pub path: PathBuf,
    pub checksum: String,
    pub entries: usize,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Archives every file under `source_dir` into `dest`, replacing any archive
/// already there. Entry names are relative to `source_dir`; the directory's
/// own `.created_at` sidecar is left out.
pub fn pack_directory(source_dir: &Path, dest: &Path) -> Result<PackedArchive, ArchiveError> {
    let partial = dest.with_extension("zip.partial");
    let entries = match write_zip(source_dir, &partial) {
        Ok(entries) => entries,
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
    };

    std::fs::rename(&partial, dest).map_err(io_err(dest))?;
    let checksum = checksum_file(dest)?;

    log::debug!(
        "Packed {} files from {} into {}",
        entries,
        source_dir.display(),
        dest.display()
    );

    Ok(PackedArchive {
        path: dest.to_path_buf(),
        checksum,
        entries,
    })
}

fn write_zip(source_dir: &Path, partial: &Path) -> Result<usize, ArchiveError> {
    let file = File::create(partial).map_err(io_err(partial))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0;
    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();
    for entry in walker {
        let entry = entry.map_err(|e| ArchiveError::Walk {
            path: source_dir.to_path_buf(),
            source: e,
        })?;
        if entry.depth() == 1 && entry.file_name() == SIDECAR_FILE {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer
                .add_directory(name.clone(), options)
                .map_err(|e| ArchiveError::Zip {
                    entry: name,
                    source: e,
                })?;
            continue;
        }

        writer
            .start_file(name.clone(), options)
            .map_err(|e| ArchiveError::Zip {
                entry: name.clone(),
                source: e,
            })?;
        let mut source = File::open(entry.path()).map_err(io_err(entry.path()))?;
        io::copy(&mut source, &mut writer).map_err(io_err(entry.path()))?;
        entries += 1;
    }

    let mut inner = writer.finish().map_err(|e| ArchiveError::Zip {
        entry: "<central directory>".to_string(),
        source: e,
    })?;
    io::Write::flush(&mut inner).map_err(io_err(partial))?;
    Ok(entries)
}

/// `sha256:<lowercase hex>` digest of a file's bytes.
pub fn checksum_file(path: &Path) -> Result<String, ArchiveError> {
    let mut file = File::open(path).map_err(io_err(path))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(io_err(path))?;
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn sample_workdir(root: &Path) -> PathBuf {
        let dir = root.join("taskid.a_moment.202603010930");
        std::fs::create_dir_all(dir.join("images")).unwrap();
        std::fs::write(dir.join(SIDECAR_FILE), "2026-03-01T09:30:00+08:00").unwrap();
        std::fs::write(dir.join("content.md"), "# Title\n").unwrap();
        std::fs::write(dir.join("content_list.json"), "[]").unwrap();
        std::fs::write(dir.join("images/p1.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
        dir
    }

    #[test]
    fn test_pack_directory_entries_and_checksum() {
        let temp = TempDir::new().unwrap();
        let workdir = sample_workdir(temp.path());
        let dest = temp.path().join("out.zip");

        let packed = pack_directory(&workdir, &dest).unwrap();
        assert_eq!(packed.entries, 3);
        assert!(packed.checksum.starts_with("sha256:"));
        assert_eq!(packed.checksum.len(), "sha256:".len() + 64);
        assert_eq!(checksum_file(&dest).unwrap(), packed.checksum);
        assert!(!dest.with_extension("zip.partial").exists());

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"content.md".to_string()));
        assert!(names.contains(&"images/p1.jpg".to_string()));
        assert!(!names.iter().any(|n| n.contains(SIDECAR_FILE)));

        let mut body = String::new();
        archive
            .by_name("content.md")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "# Title\n");
    }

    #[test]
    fn test_pack_directory_replaces_existing_archive() {
        let temp = TempDir::new().unwrap();
        let workdir = sample_workdir(temp.path());
        let dest = temp.path().join("out.zip");
        std::fs::write(&dest, "not a zip").unwrap();

        let packed = pack_directory(&workdir, &dest).unwrap();
        assert!(zip::ZipArchive::new(File::open(&dest).unwrap()).is_ok());
        assert_eq!(checksum_file(&dest).unwrap(), packed.checksum);
    }

    #[test]
    fn test_checksum_known_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            checksum_file(&path).unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pack_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("o.zip");
        let result = pack_directory(&temp.path().join("missing"), &dest);
        assert!(matches!(result, Err(ArchiveError::Walk { .. })));
        assert!(!dest.with_extension("zip.partial").exists());
    }
}
