//! `kit versions <package>`

use anyhow::Result;

use crate::kit::Kit;
use crate::render::{Spinner, Term};

pub fn versions(term: &Term, pkg_name: &str) -> Result<()> {
    let kit = Kit::new(true, term.clone())?;
    let pkg = super::resolve_package(&kit, pkg_name)?;

    let spinner = Spinner::new("Fetching versions...");
    term.mount(spinner.clone());

    let result = pkg.versions(&kit);
    spinner.stop();

    let versions = result?;
    for version in versions {
        term.println(version);
    }
    Ok(())
}
