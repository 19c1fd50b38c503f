//! Isolated process execution for the build stage.
//!
//! Every process the build stage starts (the toolchain version probe and the
//! compiler itself) runs with a cleared environment:
//! - `PATH` set to the toolchain search path only
//! - `HOME` set to `/homeless-shelter`
//! - `TMPDIR`/`TMP`/`TEMP`/`TEMPDIR` inside the build workspace
//! - `LANG`/`LC_ALL` set to `C`
//! - `SOURCE_DATE_EPOCH` fixed for reproducible timestamps
//!
//! Callers layer forwarded host variables, static variables and the oracle's
//! variables on top.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::consts::SOURCE_DATE_EPOCH;

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to read output of {program}: {source}")]
  Io {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} did not finish within {timeout:?}")]
  TimedOut { program: String, timeout: Duration },
}

/// Captured result of a finished process. Output is already redacted.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
  /// Exit code, `None` when terminated by a signal.
  pub code: Option<i32>,
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

impl CmdOutput {
  /// Stderr followed by stdout, the way a compiler's diagnostics are read.
  pub fn diagnostics(&self) -> String {
    match (self.stderr.trim().is_empty(), self.stdout.trim().is_empty()) {
      (false, false) => format!("{}{}", self.stderr, self.stdout),
      (false, true) => self.stderr.clone(),
      (true, _) => self.stdout.clone(),
    }
  }
}

/// Build a command with the isolated base environment.
pub fn isolated_command(program: &Path, cwd: &Path, tmp_dir: &Path, search_path: &OsStr) -> Command {
  let mut command = Command::new(program);
  command
    .current_dir(cwd)
    .env_clear()
    .env("PATH", search_path)
    .env("HOME", "/homeless-shelter")
    .env("TMPDIR", tmp_dir)
    .env("TMP", tmp_dir)
    .env("TEMP", tmp_dir)
    .env("TEMPDIR", tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  command
}

/// Run `command` to completion, capturing both streams line by line.
///
/// Each line passes through `redact` before it is logged or kept. With a
/// `timeout`, the process is killed once it expires.
pub async fn run_captured<F>(mut command: Command, redact: F, timeout: Option<Duration>) -> Result<CmdOutput, CmdError>
where
  F: Fn(&str) -> String,
{
  let program = command.as_std().get_program().to_string_lossy().into_owned();

  let mut child = command.spawn().map_err(|source| CmdError::Spawn {
    program: program.clone(),
    source,
  })?;
  debug!(program = %program, pid = ?child.id(), "spawned process");

  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  let run = async {
    let (out, err, status) = tokio::join!(
      drain(stdout, "stdout", &redact),
      drain(stderr, "stderr", &redact),
      child.wait()
    );
    Ok::<_, std::io::Error>((out?, err?, status?))
  };

  let finished = match timeout {
    Some(limit) => tokio::time::timeout(limit, run).await.ok(),
    None => Some(run.await),
  };

  let Some(result) = finished else {
    let limit = timeout.unwrap_or_default();
    warn!(program = %program, timeout = ?limit, "process timed out, killing");
    let _ = child.kill().await;
    return Err(CmdError::TimedOut { program, timeout: limit });
  };

  let (stdout, stderr, status) = result.map_err(|source| CmdError::Io {
    program: program.clone(),
    source,
  })?;

  debug!(program = %program, code = ?status.code(), "process exited");

  Ok(CmdOutput {
    code: status.code(),
    success: status.success(),
    stdout,
    stderr,
  })
}

async fn drain<R, F>(reader: Option<R>, stream: &'static str, redact: &F) -> std::io::Result<String>
where
  R: AsyncRead + Unpin,
  F: Fn(&str) -> String,
{
  let Some(reader) = reader else {
    return Ok(String::new());
  };

  let mut reader = BufReader::new(reader);
  let mut buf = Vec::new();
  let mut collected = String::new();

  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
      break;
    }
    let line = redact(&String::from_utf8_lossy(&buf));
    debug!(stream, line = %line.trim_end(), "build output");
    collected.push_str(&line);
  }

  Ok(collected)
}
