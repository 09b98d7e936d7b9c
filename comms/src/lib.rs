//! Length prefixed frames over any async byte stream.
//!
//! Every frame is a big endian `u32` byte count followed by that many bytes,
//! the bytes are one serialized `msg::Msg`.

mod deserialize;
pub mod msg;
mod receiver;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use receiver::{DEFAULT_MAX_FRAME_LEN, FrameReceiver};
pub use sender::FrameSender;
pub use serialize::Serialize;

type FrameLen = u32;
const FRAME_LEN_SIZE: usize = size_of::<FrameLen>();

/// Wraps both halves of a stream into framed ends.
///
/// # Arguments
/// * `rx` - The read half.
/// * `tx` - The write half.
///
/// # Returns
/// The receiving and the sending end.
pub fn framed<R, W>(rx: R, tx: W) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReceiver::new(rx), FrameSender::new(tx))
}
