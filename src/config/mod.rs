//! Configuration management.
//!
//! # Data Flow
//! ```text
//! CLI flags (+ MAEGASHIRA_* env overrides)
//!     → schema.rs (ProxyConfig, defaults per field)
//!     → Primary controller (immutable for the process lifetime)
//!
//! Routing-table file (JSON):
//!     loader.rs (parse & deserialize)
//!     → routing::validation (semantic checks)
//!     → RoutingStore::set
//! ```
//!
//! # Design Decisions
//! - Process config is immutable once loaded; the routing table is the only
//!   hot-reloadable piece, and it reloads through the store, not here
//! - All fields have defaults so a bare `maegashira start` works

pub mod loader;
pub mod schema;

pub use schema::ProxyConfig;
