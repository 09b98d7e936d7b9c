use std::io;

/// Reads a value from the wire format, possibly borrowing from the buffer.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self>;
}
