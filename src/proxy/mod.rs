//! Request-path engine.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → server.rs (state machine orchestration)
//!     → matcher (routing snapshot captured here)
//!     → middleware.rs (pre phase)
//!     → auth.rs (gate before dispatch)
//!     → dispatch.rs (forward / static target)
//!     → middleware.rs (post phase)
//!     → transaction.rs record → sink
//! ```

pub mod auth;
pub mod dispatch;
pub mod middleware;
pub mod server;
pub mod transaction;

pub use dispatch::Dispatcher;
pub use middleware::{Action, Middleware, MiddlewareRegistry, MiddlewareState};
pub use server::WorkerState;
pub use transaction::Transaction;
