//! stagehand-lib: Core types and logic for stagehand
//!
//! stagehand turns a source tree plus a build-time connection descriptor into a
//! minimal runtime image containing exactly one compiled artifact:
//! - `recipe`: the Lua pipeline recipe and its typed definition
//! - `secret`: the build-time configuration value and its leak fingerprint
//! - `oracle`: the live (or fixture) resource the compiler validates against
//! - `build`: the build stage executor
//! - `artifact`: the artifact contract handed from build to runtime stage
//! - `image`: the runtime image assembler
//! - `pipeline`: stage sequencing

pub mod artifact;
pub mod build;
pub mod consts;
pub mod context;
pub mod image;
pub mod oracle;
pub mod pipeline;
pub mod platform;
pub mod recipe;
pub mod secret;
pub mod store_lock;
pub mod util;
