//! Mount records: the filesystem-visible changes a package applies outside
//! its own payload directory, persisted as replayable actions.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};

use crate::db::{Db, DbError, Installation, MountAction};
use crate::fsroot::RootDir;

pub const ACTION_LINK_BIN: &str = "link_bin";

/// An installation transaction plus its recorded mount actions. Dropping a
/// mount without [`Mount::enable`] rolls the transaction back.
pub struct Mount<'a> {
    home: &'a RootDir,
    installation: Installation<'a>,
    actions: Vec<MountAction>,
}

impl<'a> Mount<'a> {
    pub fn begin(
        home: &'a RootDir,
        db: &'a Db,
        name: &str,
        repo: &str,
        version: &str,
    ) -> Result<Mount<'a>, DbError> {
        let installation = db.begin_installation(name, repo, version, false)?;
        Ok(Mount {
            home,
            installation,
            actions: Vec::new(),
        })
    }

    /// Records the intent to symlink `bin/<link_name>` at the mounted
    /// `target`.
    pub fn link_bin(&mut self, target: &str, link_name: &str) -> Result<(), DbError> {
        let mut data = BTreeMap::new();
        data.insert("target".to_string(), target.to_string());
        data.insert("linkName".to_string(), link_name.to_string());
        let action = self
            .installation
            .record_mount_action(ACTION_LINK_BIN, &data)?;
        self.actions.push(action);
        Ok(())
    }

    /// Replays the recorded actions against the mounted directory, marks the
    /// installation active and commits. `mount_dir` is relative to the home
    /// root.
    pub fn enable(self, mount_dir: &str) -> Result<()> {
        for action in &self.actions {
            match action.action.as_str() {
                ACTION_LINK_BIN => {
                    let target = &action.data["target"];
                    let link_name = &action.data["linkName"];

                    let link_path = format!("bin/{link_name}");
                    match self.home.remove_file(&link_path) {
                        Ok(()) => {}
                        Err(crate::fsroot::RootError::Io(e))
                            if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }

                    let rel_target = relative_from_dir("bin", &format!("{mount_dir}/{target}"));
                    self.home
                        .symlink(&link_path, &rel_target)
                        .with_context(|| format!("creating {link_path}"))?;
                }
                other => bail!("unknown action \"{other}\""),
            }
        }

        self.installation.set_active(true)?;
        self.installation.commit()?;
        Ok(())
    }
}

/// Relative path from a directory to a target, both relative to the same
/// root.
fn relative_from_dir(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|p| !p.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|p| !p.is_empty()).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    for _ in common..from.len() {
        parts.push("..");
    }
    parts.extend(&to[common..]);
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use tempfile::tempdir;

    #[test]
    fn relative_paths_climb_out_of_bin() {
        assert_eq!(
            relative_from_dir("bin", "packages/go/v1.22.0/bin/go"),
            "../packages/go/v1.22.0/bin/go"
        );
        assert_eq!(relative_from_dir("bin", "bin/tool"), "tool");
    }

    #[cfg(unix)]
    #[test]
    fn enable_creates_symlinks_and_activates() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::create_dir_all(dir.path().join("packages/go/v1.22.0/bin")).unwrap();
        std::fs::write(dir.path().join("packages/go/v1.22.0/bin/go"), b"bin").unwrap();

        let home = RootDir::open(dir.path()).unwrap();
        let db = Db::open(&dir.path().join("kit.sqlite")).unwrap();

        let mut mount = Mount::begin(&home, &db, "go", "core", "1.22.0").unwrap();
        mount.link_bin("bin/go", "go").unwrap();
        mount.enable("packages/go/v1.22.0").unwrap();

        let link = dir.path().join("bin/go");
        let target = std::fs::read_link(&link).unwrap();
        assert_eq!(
            target,
            std::path::PathBuf::from("../packages/go/v1.22.0/bin/go")
        );
        assert_eq!(std::fs::read(&link).unwrap(), b"bin");
        assert_eq!(
            db.installation_active("go", "core", "1.22.0").unwrap(),
            Some(true)
        );
    }

    #[cfg(unix)]
    #[test]
    fn enable_replaces_stale_links() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::create_dir_all(dir.path().join("packages/go/v1.22.0/bin")).unwrap();
        std::fs::write(dir.path().join("packages/go/v1.22.0/bin/go"), b"new").unwrap();
        std::os::unix::fs::symlink("dangling", dir.path().join("bin/go")).unwrap();

        let home = RootDir::open(dir.path()).unwrap();
        let db = Db::open(&dir.path().join("kit.sqlite")).unwrap();

        let mut mount = Mount::begin(&home, &db, "go", "core", "1.22.0").unwrap();
        mount.link_bin("bin/go", "go").unwrap();
        mount.enable("packages/go/v1.22.0").unwrap();

        assert_eq!(std::fs::read(dir.path().join("bin/go")).unwrap(), b"new");
    }

    #[test]
    fn dropping_without_enable_rolls_back() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        let home = RootDir::open(dir.path()).unwrap();
        let db = Db::open(&dir.path().join("kit.sqlite")).unwrap();

        {
            let mut mount = Mount::begin(&home, &db, "go", "core", "1.22.0").unwrap();
            mount.link_bin("bin/go", "go").unwrap();
        }
        assert_eq!(db.installation_active("go", "core", "1.22.0").unwrap(), None);
    }
}
