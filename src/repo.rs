//! Repository loading, pulling and package indexing.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::bindings::InstallBinding;
use crate::db::CoreInfo;
use crate::fsroot::RootDir;
use crate::gitcli::{self, PullOutcome};
use crate::kit::Kit;
use crate::lang::env::Environment;
use crate::lang::value::Value;
use crate::lang::{self, stdlib};
use crate::render::{Spinner, TextInput};

pub const REPOSITORIES_FILE: &str = "repositories.kit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub name: String,
    pub kind: RepoType,
    pub url: String,
    pub branch: Option<String>,
    pub dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoType {
    Git,
    Dir,
}

/// Parses the repositories manifest, itself a kit script whose
/// `repositories` export is a list of repo objects. Names must be unique.
pub fn load_repos(home: &RootDir) -> Result<Vec<Repo>> {
    let manifest = home.base().join(REPOSITORIES_FILE);
    let src = home.read_to_string(REPOSITORIES_FILE)?;
    let env = lang::execute(&src)
        .map_err(|e| anyhow!("error loading {}: {e}", manifest.display()))?;

    let repos_v = env
        .get_export("repositories")
        .map_err(|e| anyhow!("error loading {}: {e}", manifest.display()))?;
    let Some(list) = repos_v.as_list() else {
        bail!(
            "error loading {}: expected \"repositories\" export to be a list",
            manifest.display()
        );
    };

    let mut repos: Vec<Repo> = Vec::with_capacity(list.len());
    for item in list.items() {
        let Some(obj) = item.as_object() else {
            bail!(
                "error loading {}: expected repository item to be an object",
                manifest.display()
            );
        };

        let name = obj
            .get_string("name")
            .map_err(|e| anyhow!("error loading {}: {e}", manifest.display()))?;
        let type_str = obj
            .get_string("type")
            .map_err(|e| anyhow!("error loading {}: {e}", manifest.display()))?;
        let url = obj
            .get_string("url")
            .map_err(|e| anyhow!("error loading {}: {e}", manifest.display()))?;

        let kind = match type_str.as_str() {
            "git" => RepoType::Git,
            "dir" => RepoType::Dir,
            other => bail!(
                "error loading {}: repository type \"{other}\" is not supported (only \"git\" and \"dir\" are supported at this time)",
                manifest.display()
            ),
        };

        let branch = if kind == RepoType::Git {
            Some(
                obj.get_string("branch")
                    .map_err(|e| anyhow!("error loading {}: {e}", manifest.display()))?,
            )
        } else {
            None
        };

        let dir = match obj.try_get("dir") {
            None => String::new(),
            Some(Value::Str(s)) => s.to_string(),
            Some(other) => bail!(
                "error loading {}: expected string value called \"dir\" is of type {}",
                manifest.display(),
                other.kind()
            ),
        };

        if repos.iter().any(|r| r.name == name) {
            bail!(
                "error loading {}: name \"{name}\" is duplicated",
                manifest.display()
            );
        }

        repos.push(Repo {
            name,
            kind,
            url,
            branch,
            dir,
        });
    }

    Ok(repos)
}

/// True when the manifest changed since the last pull (mtime compared at
/// second precision) or the last pull is older than the refresh interval.
fn should_auto_pull(
    info: Option<&CoreInfo>,
    manifest_mtime: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let Some(info) = info else {
        return true;
    };
    !(manifest_mtime == info.last_pull_list_mtime
        && now - info.last_pulled_at < chrono::Duration::hours(24))
}

fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0).single().unwrap_or(t)
}

impl Kit {
    pub(crate) fn check_for_auto_repo_pull(&self) -> Result<()> {
        let info = self.db().core_info()?;
        let modified = self.home().metadata(REPOSITORIES_FILE)?.modified()?;
        let manifest_mtime = truncate_to_seconds(modified.into());

        if !should_auto_pull(info.as_ref(), manifest_mtime, Utc::now()) {
            return Ok(());
        }

        self.pull_repos()?;
        self.db().update_core_info(&CoreInfo {
            last_pulled_at: Utc::now(),
            last_pull_list_mtime: manifest_mtime,
        })?;
        Ok(())
    }

    /// Fetches every configured repository sequentially and re-indexes the
    /// ones that changed.
    pub fn pull_repos(&self) -> Result<()> {
        let spinner = Spinner::new("Pulling repositories...");
        self.term().mount(spinner.clone());
        let result = self.pull_repos_inner();
        spinner.stop();
        result
    }

    fn pull_repos_inner(&self) -> Result<()> {
        let existing = self.home().read_dir("repos")?;

        for repo in self.repos() {
            let repo_dir = format!("repos/{}", repo.name);
            info!(repo = %repo.name, "pulling repository");

            match repo.kind {
                RepoType::Dir => {
                    // Remove and recopy; cheap enough for local trees.
                    self.home().remove_dir_all(&repo_dir)?;
                    copy_dir(Path::new(&repo.url), &self.home().base().join(&repo_dir))
                        .with_context(|| format!("copying repository {}", repo.name))?;
                    self.index_repo(repo)?;
                }
                RepoType::Git => {
                    let client = gitcli::Client::new(self.git_prompt());
                    let mut do_index = true;

                    if !existing.contains(&repo.name) {
                        // Clone into staging on the same filesystem, then
                        // rename into place.
                        let clone_dir = tempfile::Builder::new()
                            .prefix("kit-clone-")
                            .tempdir_in(self.home().base().join("tmp"))
                            .context("error pulling repos")?;
                        let clone_target = clone_dir.path().join("repo");

                        client.clone_repo(&repo.url, repo.branch.as_deref(), &clone_target)?;

                        let rel = clone_target
                            .strip_prefix(self.home().base())
                            .context("clone staging is outside the home root")?;
                        self.home().rename(rel, &repo_dir)?;
                    } else {
                        let outcome =
                            client.pull(&self.home().base().join(&repo_dir), &repo.url)?;
                        if outcome == PullOutcome::AlreadyUpToDate {
                            debug!(repo = %repo.name, "already up to date, skipping index");
                            do_index = false;
                        }
                    }

                    if do_index {
                        self.index_repo(repo)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn git_prompt(&self) -> gitcli::PromptHandler {
        let term = self.term().clone();
        Arc::new(move |prompt: &str, secret: bool| {
            let input = TextInput::new(format!("Git: {prompt} "), secret);
            term.mount(input.clone());
            Ok(input.read())
        })
    }

    /// Executes every package script under the repo's package directory
    /// with inert install bindings and replaces the repo's catalog rows in
    /// one transaction.
    fn index_repo(&self, repo: &Repo) -> Result<()> {
        let mut repo_pkg_path = format!("repos/{}", repo.name);
        if !repo.dir.is_empty() {
            repo_pkg_path = format!("{repo_pkg_path}/{}", repo.dir.trim_matches('/'));
        }

        let entries = self.home().read_dir(&repo_pkg_path)?;
        let idx = self.db().begin_package_index(&repo.name)?;

        for entry in entries {
            let pkg_path = format!("{repo_pkg_path}/{entry}");
            if !self
                .home()
                .metadata(&pkg_path)
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                continue;
            }

            let src = self
                .home()
                .read_to_string(format!("{pkg_path}/package.kit"))
                .with_context(|| format!("error loading {pkg_path}"))?;

            // Bindings are attached before execution so the top level can
            // reference them, but invoking one during indexing is an error.
            let env = Environment::new();
            stdlib::load(&env);
            InstallBinding::inert().load(&env);
            let prog =
                lang::parse(&src).map_err(|e| anyhow!("error loading {pkg_path}: {e}"))?;
            env.execute(&prog)
                .map_err(|e| anyhow!("error loading {pkg_path}: {e}"))?;

            let name_v = env
                .get_export("name")
                .map_err(|e| anyhow!("error loading {pkg_path}: {e}"))?;
            let Some(name) = name_v.as_str() else {
                bail!("error loading {pkg_path}: expected \"name\" export to be a string");
            };

            idx.index_package(name, &pkg_path)?;
            debug!(package = name, path = %pkg_path, "indexed package");
        }

        idx.commit()?;
        Ok(())
    }
}

/// Deep-copies a directory tree, preserving symlinks. File modes are masked
/// with 0744.
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());

        if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(link_target, &target)?;
            #[cfg(not(unix))]
            bail!("symlinks are not supported on this platform");
        } else if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry.metadata()?.permissions().mode();
                fs::set_permissions(
                    &target,
                    fs::Permissions::from_mode(0o644 | (mode & 0o744)),
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn home_with_manifest(manifest: &str) -> (tempfile::TempDir, RootDir) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(REPOSITORIES_FILE), manifest).unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn parses_the_manifest() {
        let (_dir, home) = home_with_manifest(
            r#"export repositories = [
    {
        name = "core"
        type = "git"
        url = "https://example.com/core.git"
        branch = "refs/heads/main"
        dir = "packages"
    },
    {
        name = "local"
        type = "dir"
        url = "/srv/kit-repo"
    }
]
"#,
        );

        let repos = load_repos(&home).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "core");
        assert_eq!(repos[0].kind, RepoType::Git);
        assert_eq!(repos[0].branch.as_deref(), Some("refs/heads/main"));
        assert_eq!(repos[0].dir, "packages");
        assert_eq!(repos[1].kind, RepoType::Dir);
        assert_eq!(repos[1].dir, "");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (_dir, home) = home_with_manifest(
            r#"export repositories = [
    { name = "core"; type = "dir"; url = "/a" },
    { name = "core"; type = "dir"; url = "/b" }
]
"#,
        );
        let err = load_repos(&home).unwrap_err();
        assert!(err.to_string().contains("duplicated"));
    }

    #[test]
    fn git_repos_require_a_branch() {
        let (_dir, home) = home_with_manifest(
            r#"export repositories = [
    { name = "core"; type = "git"; url = "https://example.com/x.git" }
]
"#,
        );
        let err = load_repos(&home).unwrap_err();
        assert!(err.to_string().contains("branch"));
    }

    #[test]
    fn auto_pull_gate() {
        let mtime = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let now = mtime + chrono::Duration::hours(1);

        // No pull recorded yet.
        assert!(should_auto_pull(None, mtime, now));

        // Unchanged manifest, recent pull.
        let info = CoreInfo {
            last_pulled_at: mtime,
            last_pull_list_mtime: mtime,
        };
        assert!(!should_auto_pull(Some(&info), mtime, now));

        // The manifest changed.
        let newer_mtime = mtime + chrono::Duration::seconds(5);
        assert!(should_auto_pull(Some(&info), newer_mtime, now));

        // Stale pull.
        let much_later = mtime + chrono::Duration::hours(25);
        assert!(should_auto_pull(Some(&info), mtime, much_later));
    }

    #[test]
    fn copy_dir_preserves_layout() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("packages/go")).unwrap();
        fs::write(src.path().join("packages/go/package.kit"), "export name = \"go\"").unwrap();

        let dst = tempdir().unwrap();
        copy_dir(src.path(), &dst.path().join("repo")).unwrap();
        assert!(dst.path().join("repo/packages/go/package.kit").exists());
    }
}
