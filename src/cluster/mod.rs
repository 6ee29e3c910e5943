//! Cluster topology: one primary controller and N supervised workers.
//!
//! # Data Flow
//! ```text
//! Primary (primary.rs)
//!     owns RoutingStore, sink, discovery, management API
//!     → spawns workers (worker.rs), one listener each via SO_REUSEPORT
//!     → watch channel carries routing snapshots downward
//!     → respawns dead workers and re-broadcasts the table
//! ```
//!
//! # Design Decisions
//! - Workers are supervised tasks with independent listeners on the shared
//!   port; the OS balances accepts across them
//! - A worker applies table updates in the order the store accepted them;
//!   requests already in flight finish on their captured snapshot

pub mod primary;
pub mod worker;

pub use primary::Primary;
