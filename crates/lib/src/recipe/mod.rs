//! Pipeline recipes.
//!
//! A recipe is a Lua file returning a table that declares the pinned toolchain,
//! the compile invocation, the name of the build-time configuration variable,
//! the artifact, and the runtime image:
//!
//! ```lua
//! return {
//!   name = "users-service",
//!   build = {
//!     toolchain = { program = "cargo", version = "1.80.0", path = { "/usr/local/cargo/bin", "/usr/bin", "/bin" } },
//!     args = { "build", "--release", "--locked" },
//!     config_var = "DATABASE_URL",
//!     pass_env = { "CARGO_HOME", "RUSTUP_HOME" },
//!   },
//!   artifact = { name = "app", path = "target/release/app" },
//!   runtime = { install_path = "/usr/local/bin/app", expose = { 8080 } },
//! }
//! ```
//!
//! Recipes cannot read the invoker's environment, so the configuration value
//! can never end up as a literal in a recipe or anything derived from it.

mod lua;
mod types;

pub use lua::load_recipe;
pub use types::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("recipe not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read recipe {path}: {message}")]
  Read { path: PathBuf, message: String },

  // mlua errors are not Sync; keep the rendered message only
  #[error("recipe evaluation failed: {message}")]
  Lua { message: String },

  #[error("invalid recipe field `{field}`: {message}")]
  Invalid { field: String, message: String },
}

impl From<mlua::Error> for RecipeError {
  fn from(err: mlua::Error) -> Self {
    RecipeError::Lua { message: err.to_string() }
  }
}
