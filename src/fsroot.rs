//! Root-bound filesystem capability.
//!
//! A [`RootDir`] scopes every path-taking operation under its base
//! directory. Path arguments are resolved relative to the base; absolute
//! paths, `..` traversal out of the base and symlinked escapes are refused.
//! The staging tree an install writes into, and the kit home itself, are
//! both handled through this type.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RootError {
    #[error("path {0:?} escapes the root directory")]
    Escape(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct RootDir {
    base: PathBuf,
}

impl RootDir {
    /// Opens a root over an existing directory. The base is canonicalized so
    /// later escape checks compare real paths.
    pub fn open(base: impl AsRef<Path>) -> io::Result<RootDir> {
        Ok(RootDir {
            base: base.as_ref().canonicalize()?,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolves a relative path inside the root, refusing escapes.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> Result<PathBuf, RootError> {
        let rel = rel.as_ref();
        let mut normalized = PathBuf::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(RootError::Escape(rel.to_path_buf()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    // Absolute paths are treated as rooted at the base, the
                    // way an extraction target of "/" means the root itself.
                }
            }
        }

        let joined = self.base.join(&normalized);

        // A symlink inside the tree must not redirect writes outside it:
        // canonicalize the deepest existing ancestor and require it to stay
        // under the base.
        let mut probe = joined.as_path();
        loop {
            if probe.exists() {
                let real = probe.canonicalize()?;
                if !real.starts_with(&self.base) {
                    return Err(RootError::Escape(rel.to_path_buf()));
                }
                break;
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => break,
            }
        }

        Ok(joined)
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.resolve(rel).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn metadata(&self, rel: impl AsRef<Path>) -> Result<fs::Metadata, RootError> {
        Ok(fs::metadata(self.resolve(rel)?)?)
    }

    pub fn mkdir_all(&self, rel: impl AsRef<Path>, mode: u32) -> Result<(), RootError> {
        let path = self.resolve(rel)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .recursive(true)
                .mode(mode)
                .create(&path)?;
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            fs::create_dir_all(&path)?;
        }
        Ok(())
    }

    /// Opens a sub-root, creating the directory if needed.
    pub fn open_subdir(&self, rel: impl AsRef<Path>) -> Result<RootDir, RootError> {
        let path = self.resolve(rel)?;
        fs::create_dir_all(&path)?;
        Ok(RootDir {
            base: path.canonicalize()?,
        })
    }

    pub fn create_file(&self, rel: impl AsRef<Path>, mode: u32) -> Result<fs::File, RootError> {
        let path = self.resolve(rel)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        Ok(options.open(path)?)
    }

    pub fn write(&self, rel: impl AsRef<Path>, contents: &[u8]) -> Result<(), RootError> {
        Ok(fs::write(self.resolve(rel)?, contents)?)
    }

    pub fn read_to_string(&self, rel: impl AsRef<Path>) -> Result<String, RootError> {
        Ok(fs::read_to_string(self.resolve(rel)?)?)
    }

    /// Directory entry names, sorted for deterministic iteration.
    pub fn read_dir(&self, rel: impl AsRef<Path>) -> Result<Vec<String>, RootError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(rel)?)? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    pub fn remove_file(&self, rel: impl AsRef<Path>) -> Result<(), RootError> {
        Ok(fs::remove_file(self.resolve(rel)?)?)
    }

    /// Removes a directory tree, ignoring a missing target.
    pub fn remove_dir_all(&self, rel: impl AsRef<Path>) -> Result<(), RootError> {
        match fs::remove_dir_all(self.resolve(rel)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn rename(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<(), RootError> {
        Ok(fs::rename(self.resolve(from)?, self.resolve(to)?)?)
    }

    /// Creates a symlink at `link` pointing at `target`. The link location
    /// is root-bound; the target string is stored as given.
    pub fn symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<(), RootError> {
        let link = self.resolve(link)?;
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            Err(RootError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlinks are not supported on this platform",
            )))
        }
    }
}
