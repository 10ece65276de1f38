//! Native-messaging framing over stdin/stdout.
//!
//! A frame is a 4-byte length in native byte order followed by that many
//! bytes of UTF-8 JSON. The host reads at most one frame and writes exactly
//! one per invocation.

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("Payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a read produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Message(Value),
    /// Fewer than [`HEADER_LEN`] bytes were available.
    EndOfInput,
}

/// Encode a payload as a frame (4-byte native-endian length + JSON).
pub fn encode_frame(payload: &Value) -> Result<Vec<u8>, ChannelError> {
    let json = serde_json::to_vec(payload)?;
    let len = u32::try_from(json.len()).map_err(|_| ChannelError::PayloadTooLarge(json.len()))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + json.len());
    bytes.extend_from_slice(&len.to_ne_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; HEADER_LEN]) -> u32 {
    u32::from_ne_bytes(*header)
}

/// Read one frame, rejecting bodies longer than `max_len`.
pub async fn read_frame<R>(reader: &mut R, max_len: u32) -> Result<ReadOutcome, ChannelError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(ReadOutcome::EndOfInput);
        }
        Err(e) => return Err(ChannelError::Io(e)),
    }

    let len = decode_length(&header);
    if len > max_len {
        return Err(ChannelError::FrameTooLarge { size: len, max: max_len });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    Ok(ReadOutcome::Message(serde_json::from_slice(&body)?))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &Value) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
