use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{FRAME_LEN_SIZE, FrameLen, Serialize};

/// Writes one frame per message.
pub struct FrameSender<W: AsyncWrite + Unpin> {
    tx: W,
    /// Holds the length prefix and the owned part of the message.
    head: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            head: Vec::with_capacity(64),
        }
    }

    /// Frames `msg` and flushes it.
    ///
    /// Borrowed payloads, like parameter vectors, are written straight after
    /// the head without being copied.
    ///
    /// # Returns
    /// An `InvalidInput` error if the message does not fit a frame, or the
    /// writer's error.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { tx, head } = self;

        head.clear();
        head.extend_from_slice(&[0; FRAME_LEN_SIZE]);
        let tail = msg.serialize(head)?;

        let len = head.len() - FRAME_LEN_SIZE + tail.map_or(0, <[u8]>::len);
        let prefix = FrameLen::try_from(len).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("a message of {len} bytes does not fit in a frame"),
            )
        })?;
        head[..FRAME_LEN_SIZE].copy_from_slice(&prefix.to_be_bytes());

        tx.write_all(head).await?;
        if let Some(tail) = tail {
            tx.write_all(tail).await?;
        }

        tx.flush().await
    }
}
