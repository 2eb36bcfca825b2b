//! TCP listener serving status queries

use crate::codec::{read_frame, Frame};
use crate::connection::{spawn_writer, Connection, ConnectionSink};
use crate::error::Result;
use crate::state::ProxyState;
use crate::status::{InboundConnection, StatusSession};
use log::{debug, error, info, warn};
use shared::{Packet, ProtocolVersion};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// How long a client may stay silent before we drop it.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub struct StatusServer {
    listener: TcpListener,
    state: Arc<ProxyState>,
}

impl StatusServer {
    pub async fn bind(addr: SocketAddr, state: Arc<ProxyState>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, state).await {
                    debug!("Connection {} ended with error: {}", addr, e);
                }
            });
        }
    }
}

/// Host name as sent in the handshake, without the trailing dot or any
/// client markers appended after a NUL.
fn clean_virtual_host(server_address: &str) -> String {
    let host = server_address.split('\0').next().unwrap_or("");
    host.trim_end_matches('.').to_string()
}

async fn next_frame(reader: &mut tokio::net::tcp::OwnedReadHalf) -> Result<Option<Frame>> {
    match timeout(READ_TIMEOUT, read_frame(reader)).await {
        Ok(frame) => frame,
        Err(_) => Ok(None),
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<ProxyState>) -> Result<()> {
    let (mut reader, writer) = stream.into_split();
    let (connection, rx) = Connection::channel();
    let writer_task = spawn_writer(writer, rx);

    let (inbound, mut pending) = match next_frame(&mut reader).await? {
        Some(Frame::Packet(Packet::Handshake {
            protocol_version,
            server_address,
            ..
        })) => {
            let inbound = InboundConnection {
                remote_addr: addr,
                virtual_host: Some(clean_virtual_host(&server_address)),
                protocol_version: ProtocolVersion(protocol_version),
            };
            (inbound, None)
        }
        Some(Frame::Packet(packet @ Packet::LegacyPing { .. })) => {
            (InboundConnection::legacy(addr), Some(packet))
        }
        Some(_) => {
            debug!("{} opened with an unexpected frame", addr);
            connection.close(true);
            let _ = writer_task.await;
            return Ok(());
        }
        None => {
            connection.close(false);
            let _ = writer_task.await;
            return Ok(());
        }
    };

    let session = StatusSession::new(state, connection.clone(), inbound);
    session.activated();

    loop {
        let packet = match pending.take() {
            Some(packet) => packet,
            None => match next_frame(&mut reader).await {
                Ok(Some(Frame::Packet(packet))) => packet,
                Ok(Some(Frame::Unknown(bytes))) => {
                    debug!("{} sent {} unrecognized bytes", addr, bytes.len());
                    session.handle_unknown();
                    break;
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Read from {} failed: {}", addr, e);
                    break;
                }
            },
        };

        if let Err(e) = session.handle_packet(packet).await {
            warn!("Closing {}: {}", addr, e);
            connection.close(true);
            break;
        }
        if connection.is_closed() {
            break;
        }
    }

    connection.close(false);
    let _ = writer_task.await;
    Ok(())
}
