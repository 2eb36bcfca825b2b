//! Outbound side of a client connection
//!
//! Components never touch the socket directly. They hand packets to a
//! [`ConnectionSink`], which queues them for a dedicated writer task:
//! - `write` sends a packet and flushes it immediately
//! - `delayed_write` buffers a packet until the next `flush`
//! - `close` / `close_with` end the connection, optionally with a final packet
//!
//! Deferred writes are easy to strand. Callers that use them should hold a
//! [`FlushGuard`] for the scope that produces them.

use crate::codec::write_frame;
use log::{debug, error};
use shared::Packet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub trait ConnectionSink: Send + Sync {
    fn write(&self, packet: Packet);
    fn delayed_write(&self, packet: Packet);
    fn flush(&self);
    fn close(&self, forcefully: bool);
    fn close_with(&self, packet: Packet);
}

/// Commands consumed by the writer task, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCommand {
    Write(Packet),
    DelayedWrite(Packet),
    Flush,
    Close { forcefully: bool },
    CloseWith(Packet),
}

/// Channel-backed sink shared by everything that writes to one peer.
#[derive(Debug)]
pub struct Connection {
    tx: mpsc::UnboundedSender<SinkCommand>,
    closed: AtomicBool,
}

impl Connection {
    /// Creates a sink and the receiving end its writer consumes.
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<SinkCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            tx,
            closed: AtomicBool::new(false),
        });
        (connection, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn send(&self, command: SinkCommand) {
        if self.is_closed() {
            debug!("Dropping {:?} for closed connection", command);
            return;
        }
        if let Err(e) = self.tx.send(command) {
            debug!("Writer already gone: {}", e);
        }
    }

    /// Only the first close reaches the writer.
    fn send_close(&self, command: SinkCommand) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.tx.send(command) {
            debug!("Writer already gone: {}", e);
        }
    }
}

impl ConnectionSink for Connection {
    fn write(&self, packet: Packet) {
        self.send(SinkCommand::Write(packet));
    }

    fn delayed_write(&self, packet: Packet) {
        self.send(SinkCommand::DelayedWrite(packet));
    }

    fn flush(&self) {
        self.send(SinkCommand::Flush);
    }

    fn close(&self, forcefully: bool) {
        self.send_close(SinkCommand::Close { forcefully });
    }

    fn close_with(&self, packet: Packet) {
        self.send_close(SinkCommand::CloseWith(packet));
    }
}

/// Flushes the wrapped sink when dropped, whatever path leaves the scope.
pub struct FlushGuard<'a> {
    sink: &'a dyn ConnectionSink,
}

impl<'a> FlushGuard<'a> {
    pub fn new(sink: &'a dyn ConnectionSink) -> Self {
        Self { sink }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.sink.flush();
    }
}

/// Spawns the task that drains `rx` into `writer`.
pub fn spawn_writer<W>(writer: W, mut rx: mpsc::UnboundedReceiver<SinkCommand>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);

        while let Some(command) = rx.recv().await {
            let result = match command {
                SinkCommand::Write(packet) => match write_frame(&mut writer, &packet).await {
                    Ok(()) => writer.flush().await.map_err(Into::into),
                    Err(e) => Err(e),
                },
                SinkCommand::DelayedWrite(packet) => write_frame(&mut writer, &packet).await,
                SinkCommand::Flush => writer.flush().await.map_err(Into::into),
                SinkCommand::Close { forcefully } => {
                    if !forcefully {
                        if let Err(e) = writer.flush().await {
                            debug!("Flush before close failed: {}", e);
                        }
                        let _ = writer.shutdown().await;
                    }
                    break;
                }
                SinkCommand::CloseWith(packet) => {
                    if let Err(e) = write_frame(&mut writer, &packet).await {
                        error!("Failed to write final packet: {}", e);
                    }
                    let _ = writer.shutdown().await;
                    break;
                }
            };

            if let Err(e) = result {
                error!("Failed to write to connection: {}", e);
                break;
            }
        }
    })
}
