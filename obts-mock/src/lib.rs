//! In-process stand-ins for the OpenBTS, SIPAuthServe and SMQueue control
//! endpoints.
//!
//! Each [`MockServer`] speaks ZMTP REP and answers JSON requests from a
//! [`Registry`]. [`spawn`] starts one on a background runtime for blocking
//! tests.

pub mod metrics;
pub mod registry;
pub mod server;

use std::io;
use std::net::SocketAddr;
use std::sync::{mpsc, Arc};
use std::thread;

use obts_common::Service;

pub use metrics::{Metrics, MetricsSnapshot};
pub use registry::{Registry, MOCK_VERSION};
pub use server::{handle_connection, MockServer};

/// A mock service running on its own thread.
#[derive(Debug, Clone)]
pub struct MockHandle {
    addr: SocketAddr,
    registry: Arc<Registry>,
}

impl MockHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Endpoint string for client configuration, e.g. `tcp://127.0.0.1:40123`.
    pub fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Starts a mock of `service` on an ephemeral loopback port.
///
/// The server runs on a current-thread runtime in a detached thread and lives
/// until the process exits.
pub fn spawn(service: Service) -> io::Result<MockHandle> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("obts-mock-{service}"))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            runtime.block_on(async move {
                let server = match MockServer::bind("127.0.0.1:0", service).await {
                    Ok(server) => server,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                };
                let started = server.local_addr().map(|addr| (addr, server.registry()));
                let ok = started.is_ok();
                let _ = tx.send(started);
                if ok {
                    if let Err(err) = server.serve().await {
                        tracing::error!(%service, error = %err, "mock server stopped");
                    }
                }
            });
        })?;

    let (addr, registry) = rx
        .recv()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "mock server thread exited"))??;
    Ok(MockHandle { addr, registry })
}
