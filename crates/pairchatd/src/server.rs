//! pairchatd server - accept loop

use crate::registry::Registry;
use crate::session::SessionHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Accept failed: {0}")]
    Accept(std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Relay server state
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::BindFailed { addr, source })?;

        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared participant registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Accept connections until the listener fails.
    ///
    /// Each connection runs in its own task; accept never waits on a
    /// session. The first accept error is returned and not retried.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Listening on {}", self.local_addr()?);

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept error: {}", e);
                    return Err(ServerError::Accept(e));
                }
            };

            debug!("Accepted connection from {}", addr);
            let session = SessionHandler::new(self.registry.clone(), addr);
            tokio::spawn(async move {
                match session.run(stream).await {
                    Ok(reason) => debug!("Session {} closed: {}", addr, reason),
                    Err(e) => warn!("Session error from {}: {}", addr, e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = server.local_addr().unwrap();

        assert_ne!(addr.port(), 0);
        assert!(server.registry().is_empty());
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let first = Server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = first.local_addr().unwrap();

        match Server::bind(addr).await {
            Err(ServerError::BindFailed { addr: failed, .. }) => assert_eq!(failed, addr),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("second bind on {} succeeded", addr),
        }
    }
}
