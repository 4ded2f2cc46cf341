//! Newline-delimited JSON framing
//!
//! Each frame is one JSON document followed by `\n`. Reads are bounded by
//! [`MAX_FRAME_SIZE`] so a peer that never sends a newline cannot grow the
//! buffer without limit.

use crate::{IpcError, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed frame size for IPC messages (64KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Read one frame into `buffer`, without the trailing newline.
///
/// Returns `Ok(false)` on a clean end of stream before any byte of a new
/// frame; a stream that closes mid-frame is a protocol error.
pub async fn read_frame<R>(reader: &mut R, buffer: &mut Vec<u8>) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buffer.clear();
    loop {
        let chunk = reader
            .fill_buf()
            .await
            .map_err(|e| IpcError::ReceiveFailed(e.to_string()))?;
        if chunk.is_empty() {
            if buffer.is_empty() {
                return Ok(false);
            }
            return Err(IpcError::ProtocolError(
                "incomplete frame: connection closed before newline terminator".to_string(),
            ));
        }

        let newline_pos = chunk.iter().position(|b| *b == b'\n');
        let to_copy = newline_pos.map_or(chunk.len(), |idx| idx + 1);
        let next_len = buffer.len() + to_copy;
        if next_len > MAX_FRAME_SIZE {
            return Err(IpcError::ProtocolError(format!(
                "Frame size {next_len} exceeds maximum allowed size of {MAX_FRAME_SIZE} bytes"
            )));
        }

        buffer.extend_from_slice(&chunk[..to_copy]);
        reader.consume(to_copy);
        if newline_pos.is_some() {
            break;
        }
    }

    // Trim trailing newline/carriage return
    if matches!(buffer.last(), Some(b'\n')) {
        buffer.pop();
        if matches!(buffer.last(), Some(b'\r')) {
            buffer.pop();
        }
    }
    Ok(true)
}

/// Read and decode one frame; `None` on a clean end of stream
pub async fn read_json<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut buffer = Vec::with_capacity(1024);
    if !read_frame(reader, &mut buffer).await? {
        return Ok(None);
    }
    serde_json::from_slice(&buffer)
        .map(Some)
        .map_err(|e| IpcError::DeserializationFailed(e.to_string()))
}

/// Encode `value` and write it as one frame
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut data =
        serde_json::to_vec(value).map_err(|e| IpcError::SerializationFailed(e.to_string()))?;
    data.push(b'\n');
    writer
        .write_all(&data)
        .await
        .map_err(|e| IpcError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| IpcError::SendFailed(e.to_string()))
}
