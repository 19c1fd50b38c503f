use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Environment variable overriding the store location.
pub const STORE_ENV: &str = "STAGEHAND_STORE";

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

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  let appdata = std::env::var("APPDATA").expect("APPDATA not set");
  PathBuf::from(appdata).join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Root of the store holding build workspaces and promoted artifacts.
///
/// ```text
/// store/
/// ├── .lock                   # shared while building, exclusive while cleaning
/// ├── work/                   # per-run build workspaces (removed when a run ends)
/// │   └── run-<random>/
/// └── artifacts/              # promoted artifacts (content-addressed)
///     └── <hash>/
///         ├── <artifact name>
///         ├── artifact.json
///         └── .stagehand-complete
/// ```
pub fn store_dir() -> PathBuf {
  if let Ok(path) = std::env::var(STORE_ENV) {
    return PathBuf::from(path);
  }
  data_dir().join("store")
}

/// Directory holding per-run build workspaces.
pub fn work_dir() -> PathBuf {
  store_dir().join("work")
}

/// Directory holding promoted artifacts.
pub fn artifacts_dir() -> PathBuf {
  store_dir().join("artifacts")
}
