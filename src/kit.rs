//! The kit instance: home layout, catalog database and loaded
//! repositories.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::db::Db;
use crate::fsroot::RootDir;
use crate::include;
use crate::render::Term;
use crate::repo::{self, Repo};

pub struct Kit {
    home: RootDir,
    db: Db,
    repos: Vec<Repo>,
    term: Term,
}

impl Kit {
    /// Opens the kit home resolved from `KIT_HOME` or the platform data
    /// directory, runs migrations and loads the repositories manifest.
    pub fn new(auto_pull: bool, term: Term) -> Result<Kit> {
        let home = resolve_home()?;
        Kit::open_at(&home, auto_pull, term)
    }

    /// Opens a kit instance over an explicit home directory.
    pub fn open_at(home_path: &Path, auto_pull: bool, term: Term) -> Result<Kit> {
        fs::create_dir_all(home_path)
            .with_context(|| format!("creating kit home at {}", home_path.display()))?;
        let home = RootDir::open(home_path)?;
        setup_home(&home)?;

        let db = Db::open(&home.base().join("kit.sqlite"))?;

        let mut kit = Kit {
            home,
            db,
            repos: Vec::new(),
            term,
        };
        kit.repos = repo::load_repos(&kit.home)?;

        if auto_pull {
            kit.check_for_auto_repo_pull()?;
        }

        Ok(kit)
    }

    pub fn home(&self) -> &RootDir {
        &self.home
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn repos(&self) -> &[Repo] {
        &self.repos
    }
}

/// Creates the home subdirectories and the default repositories manifest on
/// first run.
fn setup_home(home: &RootDir) -> Result<()> {
    for dir in ["bin", "lib", "repos", "packages", "tmp"] {
        if !home.exists(dir) {
            home.mkdir_all(dir, 0o755)?;
        }
    }

    if !home.exists(repo::REPOSITORIES_FILE) {
        home.write(
            repo::REPOSITORIES_FILE,
            include::DEFAULT_REPOSITORIES.as_bytes(),
        )?;
    }

    Ok(())
}

fn resolve_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os("KIT_HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    Ok(resolve_data_home()?.join("kit"))
}

/// Platform data directory: `%LOCALAPPDATA%` on Windows, `~/Library` on
/// macOS, `$XDG_DATA_HOME` (fallback `~/.local/share`) elsewhere.
fn resolve_data_home() -> Result<PathBuf> {
    let user_home = dirs::home_dir().context("could not determine the user home directory")?;

    #[cfg(windows)]
    {
        if let Some(data) = env::var_os("LOCALAPPDATA") {
            if !data.is_empty() {
                return Ok(PathBuf::from(data));
            }
        }
        Ok(user_home.join("AppData").join("Local"))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(user_home.join("Library"))
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        if let Some(data) = env::var_os("XDG_DATA_HOME") {
            if !data.is_empty() {
                return Ok(PathBuf::from(data));
            }
        }
        Ok(user_home.join(".local").join("share"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_at_builds_the_home_layout() {
        let dir = tempdir().unwrap();
        let kit = Kit::open_at(dir.path(), false, Term::silent()).unwrap();

        for sub in ["bin", "lib", "repos", "packages", "tmp"] {
            assert!(kit.home().exists(sub), "{sub} missing");
        }
        assert!(kit.home().exists("repositories.kit"));
        assert!(kit.home().exists("kit.sqlite"));
        // The default manifest declares one repository.
        assert_eq!(kit.repos().len(), 1);
        assert_eq!(kit.repos()[0].name, "core");
    }
}
