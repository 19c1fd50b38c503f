pub mod paths;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Platform identifier of the host the image is assembled for (e.g. "x86_64-linux")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub arch: String,
  pub os: String,
}

impl Platform {
  pub fn new(arch: &str, os: &str) -> Self {
    Self {
      arch: arch.to_string(),
      os: os.to_string(),
    }
  }

  /// The platform this process runs on. Compiled artifacts target it as well.
  pub fn current() -> Self {
    let os = match std::env::consts::OS {
      "macos" => "darwin",
      other => other,
    };
    Self::new(std::env::consts::ARCH, os)
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn platform_triple_format() {
    let platform = Platform::new("aarch64", "darwin");
    assert_eq!(platform.triple(), "aarch64-darwin");

    let platform = Platform::new("x86_64", "linux");
    assert_eq!(platform.to_string(), "x86_64-linux");
  }

  #[test]
  fn current_platform_uses_host_arch() {
    assert_eq!(Platform::current().arch, std::env::consts::ARCH);
  }
}
