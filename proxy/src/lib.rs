//! # Relay Proxy Core
//!
//! This library holds the per-connection state a multiplexing game proxy has
//! to keep consistent between one client and the backends behind it.
//!
//! ## Core Responsibilities
//!
//! ### Tab List Replication
//! Each client sees a player list that the proxy mirrors from two sources:
//! backend player list packets and local API calls. Both paths mutate the
//! same concurrent map, and every change is forwarded to the client as an
//! add, remove or narrow update packet.
//!
//! ### Status Aggregation
//! Unauthenticated status queries are answered either from local
//! configuration or by probing the candidate backends for the client's
//! virtual host in parallel and merging their replies under a configurable
//! policy. A failing backend never fails the query; it is replaced by the
//! local answer before the merge.
//!
//! ### Single-Answer Status Sessions
//! A status connection gets exactly one answer. Duplicate requests are a
//! protocol violation and unclassifiable input closes the connection.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! The outbound half of a client connection:
//! - `ConnectionSink` trait with immediate, deferred and closing writes
//! - Channel-backed `Connection` and the writer task draining it
//! - `FlushGuard` pairing deferred writes with a flush
//!
//! ### Tab List Module (`tablist`)
//! - `TabList` store with atomic check-then-insert
//! - `TabListEntry` handles whose setters forward their own updates
//! - `RemoteDelta` for backend-originated changes
//!
//! ### Status Module (`status`)
//! - `StatusAggregator` fan-out and the pure `merge` function
//! - `StatusSession` handshake guard
//! - `local_ping` fallback construction
//!
//! ### Backend Module (`backend`)
//! Backend lookup and probing: `BackendHandle`, `BackendResolver`, the
//! concurrent `BackendRegistry` and the TCP implementation `TcpBackend`.
//!
//! ### Network Module (`network`)
//! The TCP listener that turns sockets into status sessions, using the
//! length-prefixed bincode framing from `codec`.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use proxy::backend::BackendRegistry;
//! use proxy::config::ProxyConfig;
//! use proxy::network::StatusServer;
//! use proxy::state::ProxyState;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::load("relay.toml")?;
//!     let addr = config.bind_addr()?;
//!     let state = Arc::new(ProxyState::new(config, Arc::new(BackendRegistry::new())));
//!
//!     StatusServer::bind(addr, state).await?.run().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod network;
pub mod state;
pub mod status;
pub mod tablist;
