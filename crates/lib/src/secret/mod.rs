//! The build-time configuration value.
//!
//! `BuildSecret` is the only holder of the connection descriptor the compiler
//! validates against. It is read once from the invoker's environment, cannot
//! be cloned or serialized, prints redacted, and is moved into the build
//! stage's oracle so it is dropped when that stage ends.

mod descriptor;
mod fingerprint;

pub use descriptor::{ConnectionDescriptor, Target};
pub use fingerprint::{MIN_COMPONENT_LEN, SecretFingerprint};

use std::fmt;

use thiserror::Error;

/// Placeholder substituted for the secret in logs and diagnostics.
pub const REDACTED: &str = "<redacted>";

#[derive(Debug, Error)]
pub enum SecretError {
  #[error("build-time configuration variable {var} is not set")]
  Missing { var: String },

  #[error("build-time configuration variable {var} is empty")]
  Empty { var: String },

  #[error("build-time configuration variable {var} is not valid UTF-8")]
  NotUnicode { var: String },

  #[error("malformed connection descriptor: {reason}")]
  Malformed { reason: String },

  #[error("invalid value in {var}: {source}")]
  InVar {
    var: String,
    #[source]
    source: Box<SecretError>,
  },
}

/// A connection descriptor scoped to the build stage.
pub struct BuildSecret {
  var: String,
  value: String,
  password: Option<String>,
  descriptor: ConnectionDescriptor,
}

impl BuildSecret {
  /// Read the secret from the invoker's environment.
  ///
  /// Never defaults: a missing, empty or unparseable value is an error.
  pub fn from_env(var: &str) -> Result<Self, SecretError> {
    match std::env::var(var) {
      Ok(value) => Self::new(var, value),
      Err(std::env::VarError::NotPresent) => Err(SecretError::Missing { var: var.to_string() }),
      Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::NotUnicode { var: var.to_string() }),
    }
  }

  pub fn new(var: &str, value: String) -> Result<Self, SecretError> {
    if value.trim().is_empty() {
      return Err(SecretError::Empty { var: var.to_string() });
    }

    let (descriptor, password) = descriptor::parse(&value).map_err(|e| SecretError::InVar {
      var: var.to_string(),
      source: Box::new(e),
    })?;

    Ok(Self {
      var: var.to_string(),
      value,
      password,
      descriptor,
    })
  }

  /// Name of the environment variable the compiler reads the value from.
  pub fn var(&self) -> &str {
    &self.var
  }

  pub fn descriptor(&self) -> &ConnectionDescriptor {
    &self.descriptor
  }

  /// The raw value. Only the oracle exporting it to the compiler may call this.
  pub(crate) fn expose(&self) -> &str {
    &self.value
  }

  /// Replace every occurrence of the secret (and its password) in `text`.
  pub fn redact(&self, text: &str) -> String {
    let mut out = text.replace(&self.value, REDACTED);
    if let Some(password) = &self.password {
      if password.len() >= MIN_COMPONENT_LEN {
        out = out.replace(password.as_str(), REDACTED);
      }
    }
    out
  }

  /// A fingerprint able to detect the secret after the secret is gone.
  pub fn fingerprint(&self) -> SecretFingerprint {
    let components: Vec<&str> = self.password.as_deref().into_iter().collect();
    SecretFingerprint::new(&self.value, &components)
  }
}

impl fmt::Debug for BuildSecret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuildSecret")
      .field("var", &self.var)
      .field("descriptor", &self.descriptor.redacted())
      .finish()
  }
}

impl fmt::Display for BuildSecret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}={}", self.var, self.descriptor.redacted())
  }
}

impl Drop for BuildSecret {
  fn drop(&mut self) {
    let mut value = std::mem::take(&mut self.value).into_bytes();
    value.fill(0);
    std::hint::black_box(&value);
    if let Some(password) = self.password.take() {
      let mut password = password.into_bytes();
      password.fill(0);
      std::hint::black_box(&password);
    }
  }
}
