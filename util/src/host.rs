//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

use uname;

/// Environment variable pointing at the harness root directory, which contains the `params` and
/// `sessions` directories.
pub const HARNESS_ROOT_ENV: &str = "LC_HARNESS_ROOT";

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

/// Get the harness root directory from the environment.
pub fn get_harness_root() -> Result<PathBuf, env::VarError> {
    env::var(HARNESS_ROOT_ENV).map(PathBuf::from)
}
