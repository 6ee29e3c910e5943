//! Lifecycle management.
//!
//! Ordered startup (config → sink → API → workers) happens in the primary
//! controller; this module owns the shutdown coordination primitive shared by
//! every long-running task.

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownReason};
