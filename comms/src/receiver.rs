use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, FRAME_LEN_SIZE, FrameLen};

/// The largest frame a receiver accepts unless told otherwise, 256 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 << 20;

/// Reads frames and decodes them.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Caps the size of incoming frames.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Waits for the next frame and decodes it.
    ///
    /// # Arguments
    /// * `buf` - Backing storage for the frame, the decoded value may borrow
    ///   from it. Made of words so `f32` payloads stay aligned.
    ///
    /// # Returns
    /// The decoded message, or `InvalidData` if the frame exceeds the size cap
    /// or does not decode.
    pub async fn recv_into<'buf, T>(&mut self, buf: &'buf mut Vec<u32>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
    {
        let mut prefix = [0; FRAME_LEN_SIZE];
        self.rx.read_exact(&mut prefix).await?;
        let len = FrameLen::from_be_bytes(prefix) as usize;

        if len > self.max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame of {len} bytes exceeds the {} bytes limit",
                    self.max_frame_len
                ),
            ));
        }

        buf.clear();
        buf.resize(len.div_ceil(size_of::<u32>()), 0);

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
        let frame = &mut bytes[..len];
        self.rx.read_exact(frame).await?;

        T::deserialize(frame)
    }
}
