use crate::consts::{APP_NAME, HOME_ENV};
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  let userprofile = std::env::var("USERPROFILE").expect("USERPROFILE not set");
  PathBuf::from(userprofile)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  let home = std::env::var("HOME").expect("HOME not set");
  PathBuf::from(home)
}

/// Returns the directory holding all stack state.
///
/// `STACKDECL_HOME` wins over the platform default.
pub fn data_dir() -> PathBuf {
  if let Ok(home) = std::env::var(HOME_ENV)
    && !home.is_empty()
  {
    return PathBuf::from(home);
  }
  default_data_dir()
}

#[cfg(windows)]
fn default_data_dir() -> PathBuf {
  let appdata = std::env::var("APPDATA").expect("APPDATA not set");
  PathBuf::from(appdata).join(APP_NAME)
}

#[cfg(not(windows))]
fn default_data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory holding per-stack state.
pub fn stacks_dir() -> PathBuf {
  data_dir().join("stacks")
}

/// Returns the snapshot directory of a single stack.
pub fn snapshots_dir(stack: &str) -> PathBuf {
  stacks_dir().join(stack).join("snapshots")
}

/// Returns the default config file of a stack.
pub fn stack_config_path(stack: &str) -> PathBuf {
  stacks_dir().join(stack).join("config.yaml")
}
