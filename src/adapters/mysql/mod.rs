//! MySQL database integration (`mysql` feature)
//!
//! MySQL has no session-level trigger switch, so listener suppression reports
//! the tables whose triggers stay active instead of disabling them.

pub mod adapter;

pub use adapter::MySqlServer;
