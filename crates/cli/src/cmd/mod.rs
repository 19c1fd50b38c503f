mod build;
mod clean;
mod info;
mod inspect;
mod plan;
mod verify;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use info::cmd_info;
pub use inspect::cmd_inspect;
pub use plan::cmd_plan;
pub use verify::cmd_verify;
