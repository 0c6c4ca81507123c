//! `kit install <package> [version]`

use anyhow::{anyhow, Result};

use crate::ansi;
use crate::kit::Kit;
use crate::render::{Spinner, Term};
use crate::version::{match_version, pick_latest};

pub fn install(term: &Term, pkg_name: &str, version_spec: Option<&str>) -> Result<()> {
    let kit = Kit::new(true, term.clone())?;
    let pkg = super::resolve_package(&kit, pkg_name)?;
    let version_spec = version_spec.unwrap_or("latest");

    let spinner = Spinner::new(format!(
        "Installing {}{}{}...",
        ansi::cyan(pkg_name),
        ansi::bright_blue("@"),
        ansi::cyan(version_spec)
    ));
    term.mount(spinner.clone());

    let result = run(&kit, &pkg, version_spec);
    match result {
        Ok(version) => {
            spinner.succeed(format!(
                "Installed {}{}{}",
                ansi::cyan(pkg_name),
                ansi::bright_blue("@"),
                ansi::cyan(&version)
            ));
            Ok(())
        }
        Err(err) => {
            spinner.stop();
            Err(err)
        }
    }
}

fn run(kit: &Kit, pkg: &crate::package::Package, version_spec: &str) -> Result<String> {
    let versions = pkg.versions(kit)?;

    let version = if version_spec == "latest" {
        pick_latest(&versions)
            .ok_or_else(|| anyhow!("package has no versions available"))?
    } else if versions.iter().any(|v| v == version_spec) {
        version_spec
    } else {
        match_version(version_spec, &versions)
            .ok_or_else(|| anyhow!("could not match version: {version_spec}"))?
    };
    let version = version.to_string();

    pkg.install(kit, &version)?;
    Ok(version)
}
