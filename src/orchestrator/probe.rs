//! Service port reachability checks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Reports whether a TCP port on a host accepts connections.
pub trait ReachabilityProbe {
    /// Attempts one connection to `host:port`.
    fn is_reachable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Probe that opens a real TCP connection and drops it immediately.
#[derive(Clone, Copy, Debug)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    /// Default per-attempt connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a probe that abandons each connection attempt after
    /// `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONNECT_TIMEOUT)
    }
}

impl ReachabilityProbe for TcpProbe {
    fn is_reachable<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(_stream)) => true,
                Ok(Err(err)) => {
                    debug!(host, port, error = %err, "service port refused connection");
                    false
                }
                Err(_) => {
                    debug!(host, port, "service port connection attempt timed out");
                    false
                }
            }
        })
    }
}
