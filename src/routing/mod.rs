//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate table (file / API / discovery)
//!     → schema.rs (serde, closed-world deserialization)
//!     → validation.rs (semantic checks, structured errors)
//!     → store.rs (atomic snapshot swap + propagation + DNS prefetch)
//!
//! Per request:
//!     (host, path) → matcher.rs → matched Route or miss
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; readers never see a partially applied table
//! - First match wins, ordered by table position
//! - No regex in the hot path (exact host, prefix path)

pub mod matcher;
pub mod schema;
pub mod store;
pub mod validation;

pub use schema::{
    Authentication, BasicAuth, CachePolicy, ForwardTarget, LoadBalancing, MiddlewareSpec,
    RedirectTarget, Route, RoutingTable, StaticTarget, Target,
};
pub use store::RoutingStore;
