//! Command handlers for the CLI.

pub mod install;
pub mod pull;
pub mod versions;

use anyhow::{bail, Result};

use crate::kit::Kit;
use crate::package::Package;

/// Resolves a package name to a single catalog entry.
pub(crate) fn resolve_package(kit: &Kit, name: &str) -> Result<Package> {
    let mut pkgs = kit.load_package(name)?;
    if pkgs.is_empty() {
        bail!("no packages found matching name");
    }
    // TODO: ask the user to pick when multiple repositories carry the name.
    Ok(pkgs.remove(0))
}
