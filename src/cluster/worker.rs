//! Worker runtime.
//!
//! Each worker binds its own listener on the shared public port (via
//! `SO_REUSEPORT`), serves the proxy router, and drains in-flight requests
//! on shutdown.

use std::net::SocketAddr;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::time::Duration;

use crate::error::Result;
use crate::lifecycle::Shutdown;
use crate::proxy::server::{build_router, WorkerState};

/// How long a stopping worker may spend draining in-flight requests.
pub const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Bind a listener with `SO_REUSEPORT` so N workers can own independent
/// accept queues on the same `(hostname, port)`.
pub fn bind_reuseport(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    TcpListener::from_std(socket.into())
}

/// Serve the public listener until shutdown. The primary enforces the drain
/// grace period and aborts the task if draining overruns.
pub async fn run_worker(
    id: usize,
    addr: SocketAddr,
    state: WorkerState,
    shutdown: Shutdown,
) -> Result<()> {
    let listener = bind_reuseport(addr)?;
    tracing::info!(worker = id, address = %addr, "Worker listening");

    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let mut rx = shutdown.subscribe();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = rx.recv().await;
        })
        .await?;

    tracing::info!(worker = id, "Worker stopped");
    Ok(())
}
