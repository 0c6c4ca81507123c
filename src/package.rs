//! Package loading and the installation engine.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::bindings::InstallBinding;
use crate::fsroot::RootDir;
use crate::kit::Kit;
use crate::lang::env::Environment;
use crate::lang::{self, stdlib};
use crate::mount::Mount;
use crate::version::compare_versions;

/// A package resolved from the catalog. The parsed script environment is
/// cached across `versions()` and `install()`.
pub struct Package {
    pub name: String,
    pub repo: String,
    pub path: String,
    env: RefCell<Option<Rc<Environment>>>,
}

impl Kit {
    /// Looks the name up in the catalog. Multiple candidates are possible
    /// when several repositories carry the same package name.
    pub fn load_package(&self, name: &str) -> Result<Vec<Package>> {
        let records = self.db().packages_named(name)?;
        Ok(records
            .into_iter()
            .map(|r| Package {
                name: r.name,
                repo: r.repo,
                path: r.path,
                env: RefCell::new(None),
            })
            .collect())
    }
}

impl Package {
    fn script_path(&self) -> String {
        format!("{}/package.kit", self.path)
    }

    fn load_env(&self, kit: &Kit) -> Result<Rc<Environment>> {
        if let Some(env) = self.env.borrow().as_ref() {
            return Ok(env.clone());
        }

        let src = kit
            .home()
            .read_to_string(self.script_path())
            .with_context(|| format!("opening {}", self.script_path()))?;
        let env = lang::execute(&src)
            .map_err(|e| anyhow!("error loading {}: {e}", self.script_path()))?;
        stdlib::load(&env);

        *self.env.borrow_mut() = Some(env.clone());
        Ok(env)
    }

    /// Runs the script's `versions()` and returns the sorted, deduplicated
    /// version set.
    pub fn versions(&self, kit: &Kit) -> Result<Vec<String>> {
        let env = self.load_env(kit)?;

        let versions_fn = env.get_export("versions").map_err(|e| {
            anyhow!("error getting versions from {}: {e}", self.script_path())
        })?;
        if !versions_fn.is_callable() {
            bail!(
                "error getting versions from {}: expected versions export to be a function",
                self.script_path()
            );
        }

        let returned = versions_fn.call(None).map_err(|e| {
            anyhow!("error getting versions from {}: {e}", self.script_path())
        })?;
        let Some(list) = returned.as_list() else {
            bail!(
                "error getting versions from {}: expected versions export return type to be a list",
                self.script_path()
            );
        };

        let mut versions: Vec<String> = Vec::with_capacity(list.len());
        for item in list.items() {
            let Some(version) = item.as_str() else {
                bail!(
                    "error getting versions from {}: expected versions element to be a string",
                    self.script_path()
                );
            };
            if !versions.iter().any(|v| v == version) {
                versions.push(version.to_string());
            }
        }

        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// Runs the script's `install(version)` in a staging root, then
    /// atomically promotes the staging tree and activates the recorded
    /// mount actions.
    pub fn install(&self, kit: &Kit, version: &str) -> Result<()> {
        let env = self.load_env(kit)?;

        let install_fn = env
            .get_export("install")
            .map_err(|e| anyhow!("error running install in {}: {e}", self.script_path()))?;
        if !install_fn.is_callable() {
            bail!(
                "error running install in {}: expected install export to be a function",
                self.script_path()
            );
        }

        // The staging directory is removed on every error path by its drop
        // guard; a successful rename leaves nothing behind for it to clean.
        let staging = tempfile::Builder::new()
            .prefix(&format!("install-{}-", self.name))
            .tempdir_in(kit.home().base().join("tmp"))
            .with_context(|| format!("error running install in {}", self.script_path()))?;
        let staging_root = RootDir::open(staging.path())?;

        let pkg_dir = format!("packages/{}", self.name);
        kit.home().mkdir_all(&pkg_dir, 0o755)?;
        let mount_dir = format!("{pkg_dir}/v{version}");

        let binding =
            InstallBinding::new(staging_root, kit.home().base().join(&mount_dir));
        binding.load(&env);

        debug!(package = %self.name, version, "running install script");
        install_fn
            .call(Some(crate::lang::value::Value::string(version)))
            .map_err(|e| anyhow!("error running install in {}: {e}", self.script_path()))?;

        // Record the installation and its mount actions before touching the
        // final location; the row stays inactive until activation succeeds.
        let mut mount = Mount::begin(kit.home(), kit.db(), &self.name, &self.repo, version)?;
        binding.setup_mount(&mut mount)?;

        let staging_rel = staging
            .path()
            .strip_prefix(kit.home().base())
            .map(Path::to_path_buf)
            .context("staging directory is outside the home root")?;
        kit.home().remove_dir_all(&mount_dir)?;
        kit.home().rename(&staging_rel, &mount_dir)?;

        debug!(package = %self.name, version, mount_dir, "activating installation");
        mount.enable(&mount_dir)
    }
}
