//! Archive extraction into a root-bound directory.
//!
//! Implements the entry filtering the install bindings expose:
//! `from_archive_dir` strips a leading directory prefix, `skipping_base_dir`
//! drops the first path segment of every entry, and `ignoring_dir` skips
//! entries at or below a named directory. All writes go through the
//! [`RootDir`] capability.

use std::io::{Read, Seek};

use thiserror::Error;

use crate::fsroot::{RootDir, RootError};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Root(#[from] RootError),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("archive entry {0:?} is outside the archive dir {1:?}")]
    OutsideArchiveDir(String, String),
}

#[derive(Default, Clone)]
pub struct ExtractOptions {
    pub archive_dir: String,
    pub skip_base_dir: bool,
    pub ignore_dirs: Vec<String>,
}

impl ExtractOptions {
    /// Applies entry filtering; `None` means the entry is skipped.
    fn target_for(&self, name: &str) -> Result<Option<String>, ExtractError> {
        let mut name = name.trim_start_matches("./").to_string();

        if self.skip_base_dir {
            match name.split_once('/') {
                Some((_, rest)) if !rest.is_empty() => name = rest.to_string(),
                _ => return Ok(None),
            }
        }

        for dir in &self.ignore_dirs {
            if name == *dir || name.starts_with(&format!("{dir}/")) {
                return Ok(None);
            }
        }

        let archive_dir = self.archive_dir.trim_matches('/');
        if archive_dir.is_empty() {
            return Ok(Some(name));
        }
        if name == archive_dir {
            return Ok(None);
        }
        match name.strip_prefix(&format!("{archive_dir}/")) {
            Some(rest) if !rest.is_empty() => Ok(Some(rest.to_string())),
            _ => Err(ExtractError::OutsideArchiveDir(
                name,
                archive_dir.to_string(),
            )),
        }
    }
}

pub fn extract_tar<R: Read>(
    reader: R,
    opts: &ExtractOptions,
    dst: &RootDir,
) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().to_string();
        let header = entry.header();
        let mode = header.mode().unwrap_or(0o644) & 0o777;
        let is_dir = header.entry_type().is_dir();
        let is_file = header.entry_type().is_file();

        let Some(target) = opts.target_for(name.trim_end_matches('/'))? else {
            continue;
        };

        if is_dir {
            dst.mkdir_all(&target, mode)?;
        } else if is_file {
            write_entry(&mut entry, dst, &target, mode)?;
        }
        // Other entry types (links, devices) are not extracted.
    }
    Ok(())
}

pub fn extract_zip<R: Read + Seek>(
    reader: R,
    opts: &ExtractOptions,
    dst: &RootDir,
) -> Result<(), ExtractError> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| ExtractError::Archive(e.to_string()))?;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let name = file.name().trim_end_matches('/').to_string();
        let mode = file.unix_mode().unwrap_or(0o644) & 0o777;
        let is_dir = file.is_dir();

        let Some(target) = opts.target_for(&name)? else {
            continue;
        };

        if is_dir {
            dst.mkdir_all(&target, mode.max(0o755))?;
        } else {
            write_entry(&mut file, dst, &target, mode)?;
        }
    }
    Ok(())
}

fn write_entry<R: Read>(
    reader: &mut R,
    dst: &RootDir,
    target: &str,
    mode: u32,
) -> Result<(), ExtractError> {
    if let Some((parent, _)) = target.rsplit_once('/') {
        dst.mkdir_all(parent, 0o755)?;
    }
    let mut out = dst.create_file(target, mode)?;
    std::io::copy(reader, &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn extracts_with_archive_dir_prefix() {
        let dir = tempdir().unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        let bytes = tar_bytes(&[("go/bin/gofmt", b"fmt"), ("go/README", b"docs")]);

        let opts = ExtractOptions {
            archive_dir: "go".into(),
            ..Default::default()
        };
        extract_tar(Cursor::new(bytes), &opts, &root).unwrap();

        assert_eq!(root.read_to_string("bin/gofmt").unwrap(), "fmt");
        assert_eq!(root.read_to_string("README").unwrap(), "docs");
    }

    #[test]
    fn skipping_base_dir_drops_first_segment() {
        let dir = tempdir().unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        let bytes = tar_bytes(&[("pkg-1.0/bin/tool", b"bin"), ("pkg-1.0", b"")]);

        let opts = ExtractOptions {
            skip_base_dir: true,
            ..Default::default()
        };
        extract_tar(Cursor::new(bytes), &opts, &root).unwrap();

        assert_eq!(root.read_to_string("bin/tool").unwrap(), "bin");
        assert!(!root.exists("pkg-1.0"));
    }

    #[test]
    fn ignoring_dir_drops_the_subtree() {
        let dir = tempdir().unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        let bytes = tar_bytes(&[("bin/tool", b"bin"), ("doc/manual.txt", b"m")]);

        let opts = ExtractOptions {
            ignore_dirs: vec!["doc".into()],
            ..Default::default()
        };
        extract_tar(Cursor::new(bytes), &opts, &root).unwrap();

        assert!(root.exists("bin/tool"));
        assert!(!root.exists("doc"));
    }

    #[test]
    fn entry_outside_archive_dir_is_an_error() {
        let dir = tempdir().unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        let bytes = tar_bytes(&[("other/file", b"x")]);

        let opts = ExtractOptions {
            archive_dir: "go".into(),
            ..Default::default()
        };
        let err = extract_tar(Cursor::new(bytes), &opts, &root).unwrap_err();
        assert!(matches!(err, ExtractError::OutsideArchiveDir(..)));
    }

    #[test]
    fn extracts_zip_archives() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("app/bin/run", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"exe").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let dir = tempdir().unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        let opts = ExtractOptions {
            archive_dir: "app".into(),
            ..Default::default()
        };
        extract_zip(Cursor::new(bytes), &opts, &root).unwrap();
        assert_eq!(root.read_to_string("bin/run").unwrap(), "exe");
    }
}
