//! Connection descriptor parsing.
//!
//! Accepts `scheme://[user[:password]@]host[:port][/database][?query]` and the
//! file forms `sqlite://path` / `sqlite:path`. Only the non-secret parts are
//! kept; the password is handed back separately so the caller decides where it
//! lives.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::secret::SecretError;

/// Where the validation oracle has to reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
  Tcp { host: String, port: u16 },
  File { path: PathBuf },
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
      Target::Tcp { host, port } => write!(f, "{}:{}", host, port),
      Target::File { path } => write!(f, "{}", path.display()),
    }
  }
}

/// The parts of a connection descriptor that are safe to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
  pub scheme: String,
  pub user: Option<String>,
  pub has_password: bool,
  pub target: Target,
  pub database: Option<String>,
}

impl ConnectionDescriptor {
  /// Render the descriptor with credentials masked and the query dropped.
  pub fn redacted(&self) -> String {
    match &self.target {
      Target::File { path } => format!("{}://{}", self.scheme, path.display()),
      Target::Tcp { .. } => {
        let auth = match (&self.user, self.has_password) {
          (Some(user), true) => format!("{}:***@", user),
          (Some(user), false) => format!("{}@", user),
          (None, true) => ":***@".to_string(),
          (None, false) => String::new(),
        };
        let database = self.database.as_deref().map(|db| format!("/{}", db)).unwrap_or_default();
        format!("{}://{}{}{}", self.scheme, auth, self.target, database)
      }
    }
  }
}

impl fmt::Display for ConnectionDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.redacted())
  }
}

/// Well-known ports for schemes whose descriptors commonly omit one.
fn default_port(scheme: &str) -> Option<u16> {
  match scheme {
    "postgres" | "postgresql" => Some(5432),
    "mysql" | "mariadb" => Some(3306),
    "mssql" | "sqlserver" => Some(1433),
    "mongodb" => Some(27017),
    "redis" | "rediss" => Some(6379),
    "clickhouse" => Some(9000),
    _ => None,
  }
}

/// Parse a descriptor, returning its safe parts and the password, if any.
pub(crate) fn parse(value: &str) -> Result<(ConnectionDescriptor, Option<String>), SecretError> {
  let malformed = |reason: &str| SecretError::Malformed {
    reason: reason.to_string(),
  };

  let value = value.trim();
  let (scheme, rest) = value.split_once(':').ok_or_else(|| malformed("missing scheme"))?;

  if scheme.is_empty()
    || !scheme.starts_with(|c: char| c.is_ascii_alphabetic())
    || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
  {
    return Err(malformed("invalid scheme"));
  }
  let scheme = scheme.to_ascii_lowercase();

  if scheme == "sqlite" {
    let path = rest.trim_start_matches("//");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
      return Err(malformed("sqlite descriptor must name a database file"));
    }
    // The compiler resolves relative paths from its own working directory
    if !Path::new(path).is_absolute() {
      return Err(malformed("sqlite database path must be absolute"));
    }
    return Ok((
      ConnectionDescriptor {
        scheme,
        user: None,
        has_password: false,
        target: Target::File { path: PathBuf::from(path) },
        database: None,
      },
      None,
    ));
  }

  let rest = rest.strip_prefix("//").ok_or_else(|| malformed("expected '//' after scheme"))?;

  let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
  let (authority, tail) = rest.split_at(authority_end);

  // The last '@' separates credentials; passwords may themselves contain '@'
  let (userinfo, hostport) = match authority.rfind('@') {
    Some(idx) => (Some(&authority[..idx]), &authority[idx + 1..]),
    None => (None, authority),
  };

  let (user, password) = match userinfo {
    Some(info) => match info.split_once(':') {
      Some((user, password)) => (non_empty(user), Some(password.to_string())),
      None => (non_empty(info), None),
    },
    None => (None, None),
  };

  let (host, port) = split_host_port(hostport).ok_or_else(|| malformed("invalid host or port"))?;
  if host.is_empty() {
    return Err(malformed("missing host"));
  }
  let port = match port {
    Some(port) => port,
    None => default_port(&scheme).ok_or_else(|| malformed("missing port and no default is known for this scheme"))?,
  };

  let database = tail
    .strip_prefix('/')
    .map(|path| path.split(['?', '#']).next().unwrap_or_default())
    .and_then(non_empty);

  let password = password.filter(|p| !p.is_empty());

  Ok((
    ConnectionDescriptor {
      scheme,
      user,
      has_password: password.is_some(),
      target: Target::Tcp { host, port },
      database,
    },
    password,
  ))
}

fn non_empty(s: &str) -> Option<String> {
  if s.is_empty() { None } else { Some(s.to_string()) }
}

fn split_host_port(hostport: &str) -> Option<(String, Option<u16>)> {
  if let Some(rest) = hostport.strip_prefix('[') {
    let (host, after) = rest.split_once(']')?;
    let port = match after.strip_prefix(':') {
      Some(port) => Some(port.parse().ok()?),
      None if after.is_empty() => None,
      None => return None,
    };
    return Some((host.to_string(), port));
  }

  match hostport.rsplit_once(':') {
    Some((host, port)) => Some((host.to_string(), Some(port.parse().ok()?))),
    None => Some((hostport.to_string(), None)),
  }
}
