//! Files embedded into the binary.

/// Default repositories manifest written into a fresh home.
pub const DEFAULT_REPOSITORIES: &str = include_str!("../include/repositories.kit");

/// Built-in script library modules served to `import`.
pub fn lib_module(name: &str) -> Option<&'static str> {
    // No modules are shipped yet; the loader mechanism is wired so package
    // repositories can rely on it once modules land.
    let _ = name;
    None
}
