#![doc = "repo-backup-core: the backup pipeline behind the repo-backup CLI."]

//! Enumerates every repository of a GitHub account, clones them concurrently,
//! packs the resulting tree into one zip archive and optionally ships it to S3.
//!
//! # Usage
//! The CLI crate builds a [`config::RunContext`] and calls
//! [`pipeline::backup`] with concrete implementations of the traits in
//! [`contract`]. Tests inject the `mockall` mocks instead.

pub mod archive;
pub mod clone;
pub mod config;
pub mod contract;
pub mod enumerate;
pub mod error;
pub mod orchestrate;
pub mod pipeline;
pub mod upload;

pub use error::BackupError;
