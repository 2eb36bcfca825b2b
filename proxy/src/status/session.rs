use super::{local_ping, StatusQueryContext};
use crate::connection::ConnectionSink;
use crate::error::{ProxyError, Result};
use crate::state::ProxyState;
use log::{debug, info};
use shared::{Packet, ProtocolVersion, ServerPing};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the proxy knows about a client before it has logged in.
#[derive(Debug, Clone)]
pub struct InboundConnection {
    pub remote_addr: SocketAddr,
    /// Host name the client used to reach us, from the handshake.
    pub virtual_host: Option<String>,
    pub protocol_version: ProtocolVersion,
}

impl InboundConnection {
    /// A client that skipped the handshake (legacy ping).
    pub fn legacy(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            virtual_host: None,
            protocol_version: ProtocolVersion::UNKNOWN,
        }
    }
}

impl fmt::Display for InboundConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[initial connection] {}", self.remote_addr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    ReceivedRequest,
}

/// Status exchange on one connection.
///
/// The first legacy ping or status request is answered; any later one is a
/// protocol violation. Status pings are echoed regardless of state.
pub struct StatusSession {
    state: Arc<ProxyState>,
    connection: Arc<dyn ConnectionSink>,
    inbound: InboundConnection,
    received_request: AtomicBool,
}

impl StatusSession {
    pub fn new(
        state: Arc<ProxyState>,
        connection: Arc<dyn ConnectionSink>,
        inbound: InboundConnection,
    ) -> Self {
        Self {
            state,
            connection,
            inbound,
            received_request: AtomicBool::new(false),
        }
    }

    pub fn activated(&self) {
        if self.state.config.show_ping_requests {
            info!(
                "{} is pinging the server with version {}",
                self.inbound, self.inbound.protocol_version.0
            );
        }
    }

    pub fn session_state(&self) -> SessionState {
        if self.received_request.load(Ordering::Acquire) {
            SessionState::ReceivedRequest
        } else {
            SessionState::AwaitingRequest
        }
    }

    pub async fn handle_packet(&self, packet: Packet) -> Result<()> {
        match packet {
            Packet::LegacyPing { protocol_version } => self.handle_legacy_ping(protocol_version).await,
            Packet::StatusRequest => self.handle_status_request().await,
            Packet::StatusPing { payload } => {
                self.handle_status_ping(payload);
                Ok(())
            }
            other => {
                debug!("{} sent {:?} during status", self.inbound, other);
                self.handle_unknown();
                Ok(())
            }
        }
    }

    /// Answers a legacy ping and closes the connection.
    pub async fn handle_legacy_ping(&self, protocol_version: i32) -> Result<()> {
        self.begin_request()?;
        debug!("{} sent legacy ping (version {})", self.inbound, protocol_version);

        let ping = self.initial_ping().await;
        self.connection.close_with(Packet::LegacyDisconnect { ping });
        Ok(())
    }

    /// Answers a status request. The connection stays open for the ping.
    pub async fn handle_status_request(&self) -> Result<()> {
        self.begin_request()?;

        let ping = self.initial_ping().await;
        self.connection.write(Packet::StatusResponse { ping });
        Ok(())
    }

    pub fn handle_status_ping(&self, payload: i64) {
        self.connection.close_with(Packet::StatusPing { payload });
    }

    /// Anything we cannot make sense of ends the connection without a reply.
    pub fn handle_unknown(&self) {
        self.connection.close(true);
    }

    /// The answer for this client: local, or merged from backends according
    /// to the configured policy.
    pub async fn initial_ping(&self) -> ServerPing {
        let config = &self.state.config;
        let version = self.inbound.protocol_version.shown();
        // Status connections never log in, so no players are hosted here.
        let fallback = local_ping(config, version, 0);

        let context = StatusQueryContext {
            version,
            candidates: config.servers_for_host(self.inbound.virtual_host.as_deref()),
            policy: config.ping_passthrough,
            fallback,
        };
        self.state.aggregator.resolve(context).await
    }

    fn begin_request(&self) -> Result<()> {
        self.received_request
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ProxyError::UnexpectedRequest)
    }
}
