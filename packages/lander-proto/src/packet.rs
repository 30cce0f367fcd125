//! packet.rs — length-prefixed multi-message framing over a stream socket
//!
//! Reading bails out with a [`TransferError`] when the packet declares more
//! than 128 messages, a body exceeds the size cap, or any body fails to
//! parse. Writing serialises the whole packet into one buffer first so a
//! packet hits the socket atomically or not at all.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{codec, Message, MessageBag};

/// Hard cap on messages per packet.
pub const MAX_MESSAGES_COUNT: u32 = 128;

/// Hard cap on a single message body; anything larger is a framing error,
/// not a population we ever exchange.
pub const MAX_MESSAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Any I/O failure on a socket or during framed read/write, and any packet
/// exceeding limits. Recovery is the caller's: runners back off and rebind,
/// the server drops the connection and keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet header declares {0} messages; {MAX_MESSAGES_COUNT} is the allowed maximum")]
    TooManyMessages(u32),
    #[error("message body of {0} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit")]
    OversizedBody(u64),
    #[error("unknown message id {0}")]
    UnknownMessageId(u32),
    #[error("malformed payload: {0}")]
    Malformed(&'static str),
}

/// Read one whole packet into an owned bag, arrival order preserved.
pub async fn read_packet<R>(src: &mut R) -> Result<MessageBag, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    src.read_exact(&mut header).await?;
    let count = u32::from_le_bytes(header);
    if count > MAX_MESSAGES_COUNT {
        return Err(TransferError::TooManyMessages(count));
    }

    let mut msgs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut msg_header = [0u8; 12];
        src.read_exact(&mut msg_header).await?;
        let id = u32::from_le_bytes(msg_header[0..4].try_into().unwrap());
        let size = u64::from_le_bytes(msg_header[4..12].try_into().unwrap());
        if size > MAX_MESSAGE_SIZE {
            return Err(TransferError::OversizedBody(size));
        }

        let mut body = vec![0u8; size as usize];
        src.read_exact(&mut body).await?;
        msgs.push(codec::decode_message(id, &body)?);
    }
    Ok(MessageBag::new(msgs))
}

/// Serialise and write `msgs` as one packet.
pub async fn write_packet<W>(dst: &mut W, msgs: &[Message]) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    if msgs.len() as u64 > MAX_MESSAGES_COUNT as u64 {
        return Err(TransferError::TooManyMessages(msgs.len() as u32));
    }

    let mut buf = BytesMut::new();
    buf.put_u32_le(msgs.len() as u32);
    for msg in msgs {
        let body = codec::encode_message(msg);
        buf.put_u32_le(msg.id());
        buf.put_u64_le(body.len() as u64);
        buf.extend_from_slice(&body);
    }

    dst.write_all(&buf).await?;
    dst.flush().await?;
    Ok(())
}
