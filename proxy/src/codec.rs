//! Length-prefixed bincode framing used on every proxy socket

use crate::error::Result;
use bincode::{deserialize, serialize};
use shared::{Packet, MAX_FRAME_LEN};
use std::io::{Error, ErrorKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A frame read off the wire.
#[derive(Debug)]
pub enum Frame {
    Packet(Packet),
    /// Bytes that do not decode to any known packet.
    Unknown(Vec<u8>),
}

/// Writes one frame without flushing the underlying writer.
pub async fn write_frame<W>(writer: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = serialize(packet)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", data.len()),
        )
        .into());
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    Ok(())
}

/// Reads one frame. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Oversized prefixes are never a valid packet; don't buffer them.
    if len > MAX_FRAME_LEN {
        return Ok(Some(Frame::Unknown(Vec::new())));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    match deserialize::<Packet>(&buffer) {
        Ok(packet) => Ok(Some(Frame::Packet(packet))),
        Err(_) => Ok(Some(Frame::Unknown(buffer))),
    }
}
