//! # gont-common
//!
//! Shared utilities and types for the gont network testbed.
//!
//! This crate provides common functionality used across the gont crates:
//! - Common error types
//! - Runtime-state filesystem paths
//! - Name validation and the generated-name word list

#![warn(missing_docs)]

pub mod error;
pub mod names;
pub mod paths;

pub use error::{GontError, GontResult};
pub use paths::NetworkPaths;
