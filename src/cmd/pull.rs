//! `kit pull`

use anyhow::Result;

use crate::kit::Kit;
use crate::render::Term;

pub fn pull(term: &Term) -> Result<()> {
    let kit = Kit::new(false, term.clone())?;
    kit.pull_repos()
}
