//! Build stage executor.
//!
//! Compiles a build context with the pinned toolchain in an isolated
//! workspace, with the validation oracle's variables exported to the compiler
//! process only, and promotes exactly one artifact.

pub mod cmd;
mod execute;
pub mod toolchain;
mod types;
pub mod workspace;

pub use execute::{BuildStageConfig, execute_build_stage};
pub use toolchain::{ResolvedToolchain, ToolchainError, resolve_toolchain};
pub use types::{BuildError, BuildOutput};
