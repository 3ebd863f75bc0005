//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod drop;
pub mod dump;
pub mod init;
pub mod transforms;
pub mod validate;
