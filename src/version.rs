//! Version comparison and resolution.
//!
//! Versions split on `.`; each part is `(leading digits, suffix)`. Parts
//! compare numerically first, then by suffix where an empty suffix (a
//! release) outranks any non-empty one (a pre-release), then
//! lexicographically. Missing parts compare as `(0, "")`.

use std::cmp::Ordering;

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts_a: Vec<&str> = a.split('.').collect();
    let parts_b: Vec<&str> = b.split('.').collect();

    for i in 0..parts_a.len().max(parts_b.len()) {
        let pa = parts_a.get(i).copied().unwrap_or("");
        let pb = parts_b.get(i).copied().unwrap_or("");
        let ord = compare_version_part(pa, pb);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_version_part(a: &str, b: &str) -> Ordering {
    let (num_a, suffix_a) = parse_version_part(a);
    let (num_b, suffix_b) = parse_version_part(b);

    if num_a != num_b {
        return num_a.cmp(&num_b);
    }

    // A release outranks any pre-release suffix.
    match (suffix_a.is_empty(), suffix_b.is_empty()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => suffix_a.cmp(suffix_b),
    }
}

fn parse_version_part(part: &str) -> (u64, &str) {
    let digits = part.chars().take_while(|c| c.is_ascii_digit()).count();
    let num = part[..digits].parse().unwrap_or(0);
    (num, &part[digits..])
}

pub fn has_letters(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_alphabetic())
}

/// Picks the highest release version, skipping versions containing letters
/// (pre-releases like `1.26rc2`) when any plain version exists. Input must
/// be sorted ascending.
pub fn pick_latest<'a>(versions: &'a [String]) -> Option<&'a str> {
    versions
        .iter()
        .rev()
        .find(|v| !has_letters(v))
        .or_else(|| versions.last())
        .map(String::as_str)
}

/// Matches a requested version against the sorted available set: exact
/// match, or prefix match (`1.26` matches `1.26.8`) skipping lettered
/// versions.
pub fn match_version<'a>(spec: &str, versions: &'a [String]) -> Option<&'a str> {
    let prefix = format!("{spec}.");
    for version in versions.iter().rev() {
        if version == spec {
            return Some(version);
        }
        if version.starts_with(&prefix) && !has_letters(version) {
            return Some(version);
        }
    }
    None
}
