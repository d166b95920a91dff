//! ICY server listener
//!
//! Handles the TCP accept loop and turns each accepted connection into a
//! registered engine listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::engine::BroadcastEngine;
use crate::error::{Error, Result};
use crate::listener::ListenerSink;
use crate::server::config::ServerConfig;
use crate::server::http::{error_head, read_request_head, response_head};

/// How often a connection task checks whether its sink was shed
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// ICY streaming server
pub struct RadioServer {
    config: Arc<ServerConfig>,
    engine: BroadcastEngine,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RadioServer {
    /// Create a server feeding connections into `engine`
    pub fn new(config: ServerConfig, engine: BroadcastEngine) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            engine,
            connection_semaphore,
        }
    }

    pub fn engine(&self) -> &BroadcastEngine {
        &self.engine
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// Returns early only if the listener socket fails to bind; otherwise
    /// the accept loop runs forever.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            name = %self.config.name,
            "ICY server listening"
        );
        Ok(listener)
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    reject(socket, self.config.request_timeout);
                    return;
                }
            }
        } else {
            None
        };

        tracing::debug!(peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = Arc::clone(&self.config);
        let engine = self.engine.clone();

        tokio::spawn(async move {
            if let Err(e) = serve_listener(socket, peer_addr, config, engine, permit).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }
}

/// Answer 503 off the accept loop; a client that never reads cannot stall it
fn reject(mut socket: TcpStream, timeout: Duration) {
    tokio::spawn(async move {
        let head = error_head(503, "Service Unavailable");
        let _ = tokio::time::timeout(timeout, socket.write_all(head.as_bytes())).await;
    });
}

/// Negotiate one connection and keep it registered until it goes away
async fn serve_listener(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    engine: BroadcastEngine,
    _permit: Option<OwnedSemaphorePermit>,
) -> Result<()> {
    let request = tokio::time::timeout(config.request_timeout, read_request_head(&mut socket))
        .await
        .map_err(|_| Error::Http("timed out waiting for request head".into()))??;

    if request.method != "GET" {
        let head = error_head(405, "Method Not Allowed");
        socket.write_all(head.as_bytes()).await?;
        return Err(Error::Http(format!("unsupported method {}", request.method)));
    }

    let with_metadata = request.wants_metadata();
    let head = response_head(&config, with_metadata, request.header("Host"));

    let (reader, mut writer) = socket.into_split();
    writer.write_all(head.as_bytes()).await?;
    writer.flush().await?;

    let sink = ListenerSink::new(writer, with_metadata);
    let id = sink.id();
    tracing::debug!(
        peer = %peer_addr,
        listener = %id,
        metadata = with_metadata,
        path = %request.path,
        "Listener negotiated"
    );
    if !engine.add_listener(sink.clone()) {
        return Err(Error::Http("broadcast is not running".into()));
    }

    wait_for_disconnect(reader, &sink).await;
    engine.remove_listener(id);
    Ok(())
}

/// Resolve once the peer closes its side or the sink stops listening
async fn wait_for_disconnect(mut reader: OwnedReadHalf, sink: &ListenerSink) {
    let mut buf = [0u8; 512];
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                // Listeners have nothing more to say; drain and ignore
                Ok(_) => {}
            },
            _ = liveness.tick() => {
                if !sink.is_listening() {
                    return;
                }
            }
        }
    }
}
