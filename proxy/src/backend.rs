//! Backend servers the proxy can probe for status

use crate::codec::{read_frame, write_frame, Frame};
use crate::error::{ProbeError, ProxyError};
use async_trait::async_trait;
use dashmap::DashMap;
use log::info;
use shared::{Packet, ProtocolVersion, ServerPing};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A live backend that can answer a status query.
#[async_trait]
pub trait BackendHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Asks the backend for its status as seen by a client speaking
    /// `version`. Implementations bound the call with their own timeout.
    async fn probe_status(&self, version: ProtocolVersion) -> Result<ServerPing, ProbeError>;
}

/// Looks up backends by their configured name.
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn BackendHandle>>;
}

/// Concurrent name to backend map.
#[derive(Default)]
pub struct BackendRegistry {
    servers: DashMap<String, Arc<dyn BackendHandle>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend, replacing any previous one with the same name.
    pub fn register(&self, backend: Arc<dyn BackendHandle>) {
        let name = backend.name().to_string();
        info!("Registered backend {}", name);
        self.servers.insert(name, backend);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.servers.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl BackendResolver for BackendRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn BackendHandle>> {
        self.servers.get(name).map(|backend| Arc::clone(backend.value()))
    }
}

/// Backend reached over TCP with the proxy's own framing.
#[derive(Debug, Clone)]
pub struct TcpBackend {
    name: String,
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpBackend {
    pub fn new(name: impl Into<String>, addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            addr,
            timeout,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn exchange(&self, version: ProtocolVersion) -> Result<ServerPing, ProbeError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|_| ProbeError::Connect(self.addr.to_string()))?;

        let handshake = Packet::Handshake {
            protocol_version: version.0,
            server_address: self.addr.ip().to_string(),
            server_port: self.addr.port(),
        };
        write_frame(&mut stream, &handshake)
            .await
            .map_err(probe_error)?;
        write_frame(&mut stream, &Packet::StatusRequest)
            .await
            .map_err(probe_error)?;
        stream.flush().await?;

        match read_frame(&mut stream).await.map_err(probe_error)? {
            Some(Frame::Packet(Packet::StatusResponse { ping })) => Ok(ping),
            _ => Err(ProbeError::UnexpectedReply),
        }
    }
}

#[async_trait]
impl BackendHandle for TcpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe_status(&self, version: ProtocolVersion) -> Result<ServerPing, ProbeError> {
        match timeout(self.timeout, self.exchange(version)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

fn probe_error(e: ProxyError) -> ProbeError {
    match e {
        ProxyError::Io(e) => ProbeError::Io(e),
        ProxyError::Codec(e) => ProbeError::Codec(e),
        _ => ProbeError::UnexpectedReply,
    }
}
