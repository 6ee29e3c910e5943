//! Maegashira — dynamic HTTP reverse proxy.
//!
//! Accepts client requests on a public listener, resolves each against a
//! hot-reloadable routing table, optionally runs registered pre/post
//! middlewares, and forwards to an upstream target (remote origin or local
//! static directory). Designed to be embedded as a library or run standalone
//! with a management side-channel for live routing-table updates, health and
//! metrics.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                    PRIMARY                       │
//!                 │  routing store ── discovery ── management API    │
//!                 │        │ watch channel (snapshots)               │
//!                 │        ▼                                         │
//!                 │  ┌──────────┐  ┌──────────┐       ┌──────────┐   │
//!   Client ───────┼─▶│ worker 0 │  │ worker 1 │  ...  │ worker N │   │
//!                 │  └────┬─────┘  └──────────┘       └──────────┘   │
//!                 │       │ resolve → pre → auth → dispatch → post   │
//!                 │       ▼                                          │
//!                 │  transaction ──▶ post-transaction sink (Redis)   │
//!                 └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod proxy;
pub mod routing;

// Cluster topology
pub mod api;
pub mod cluster;
pub mod discovery;
pub mod sink;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use cluster::Primary;
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use lifecycle::Shutdown;
pub use proxy::{Middleware, MiddlewareRegistry, MiddlewareState, Transaction};
pub use routing::{Route, RoutingStore, RoutingTable, Target};
