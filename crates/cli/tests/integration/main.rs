//! CLI integration tests for stagehand.

#[cfg(unix)]
mod build_tests;
mod clean_tests;
mod common;
#[cfg(unix)]
mod image_tests;
#[cfg(unix)]
mod plan_tests;
