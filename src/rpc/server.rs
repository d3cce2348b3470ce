//! TCP server: one task per connection, requests on a connection answered in
//! order. Shutting down closes open connections too.

use super::wire::{read_frame, write_frame, RpcRequest, RpcResponse};
use crate::config::RpcConfig;
use crate::error::RpcError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Monotonic connection id for log correlation.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Answers requests. Called concurrently from connection tasks.
pub trait RpcService: Send + Sync + 'static {
    fn handle(&self, request: RpcRequest) -> RpcResponse;
}

pub struct RpcServer<S> {
    listener: TcpListener,
    service: Arc<S>,
    config: RpcConfig,
}

impl<S: RpcService> RpcServer<S> {
    pub async fn bind(addr: impl ToSocketAddrs, service: S, config: RpcConfig) -> Result<Self, RpcError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service: Arc::new(service),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared access to the service, e.g. for maintenance while serving.
    pub fn service(&self) -> Arc<S> {
        Arc::clone(&self.service)
    }

    /// Accept connections until `shutdown` resolves, then drop every open
    /// connection.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<(), RpcError> {
        let addr = self.local_addr()?;
        info!(%addr, "rpc server listening");
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(%addr, open = connections.len(), "rpc server shutting down");
                    break;
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            // Usually transient (e.g. too many open files).
                            error!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };
                    let conn = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
                    let service = Arc::clone(&self.service);
                    let max_frame_bytes = self.config.max_frame_bytes;
                    connections.spawn(async move {
                        debug!(conn, %peer, "client connected");
                        match serve_connection(stream, service, max_frame_bytes).await {
                            Ok(served) => debug!(conn, %peer, served, "client disconnected"),
                            Err(err) => warn!(conn, %peer, error = %err, "client connection failed"),
                        }
                    });
                }
            }
        }
        connections.shutdown().await;
        Ok(())
    }
}

async fn serve_connection<S: RpcService>(
    mut stream: TcpStream,
    service: Arc<S>,
    max_frame_bytes: usize,
) -> Result<u64, RpcError> {
    stream.set_nodelay(true)?;
    let mut served = 0u64;
    while let Some(request) = read_frame::<_, RpcRequest>(&mut stream, max_frame_bytes).await? {
        let method = request.method();
        let response = service.handle(request);
        if let RpcResponse::Failed { kind, message } = &response {
            warn!(method, %kind, %message, "request failed");
        }
        write_frame(&mut stream, &response, max_frame_bytes).await?;
        served += 1;
    }
    Ok(served)
}
