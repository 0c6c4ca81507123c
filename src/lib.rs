//! kit - a user-space package manager whose packages are small scripts.
//!
//! A package declares a `versions()` routine producing its installable
//! versions and an `install(version)` routine that fetches, unpacks and
//! stages files into the managed home. Packages resolve across configured
//! repositories, installs run in a filesystem-scoped staging root, and the
//! catalog lives in a local sqlite database.

pub mod ansi;
pub mod bindings;
pub mod cmd;
pub mod db;
pub mod fsroot;
pub mod gitcli;
pub mod include;
pub mod io;
pub mod kit;
pub mod lang;
pub mod mount;
pub mod package;
pub mod render;
pub mod repo;
pub mod version;

pub use kit::Kit;
pub use package::Package;

/// User-Agent sent on every HTTP request the manager or a script makes.
pub const USER_AGENT: &str = "Kit Package Manager";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
