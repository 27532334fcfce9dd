//! Length-prefixed stream framing for the direct-send protocol.
//!
//! Wire format: `[4-byte big-endian length][frame body]`. Both sides share
//! this module so the protocol cannot drift between them.

use futures::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::io;

/// Maximum accepted frame body, matching the pubsub message ceiling.
pub(crate) const MAX_FRAME_SIZE: usize = 1 << 21;

/// Errors from framing operations.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FrameError {
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: {0} bytes")]
    TooLarge(usize),
}

/// Write `data` as a length-prefixed frame, flush, and close the write side.
pub(crate) async fn write_frame<S: AsyncWrite + Unpin>(
    stream: &mut S,
    data: &[u8],
) -> Result<(), io::Error> {
    let len = data.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    stream.close().await?;
    Ok(())
}

/// Read one length-prefixed frame, bounded by `max_size`.
pub(crate) async fn read_frame<S: AsyncReadExt + Unpin>(
    stream: &mut S,
    max_size: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > max_size {
        return Err(FrameError::TooLarge(len));
    }

    let mut data = vec![0u8; len];
    stream.read_exact(&mut data).await?;
    Ok(data)
}
