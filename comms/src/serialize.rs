use std::io;

/// Writes a value into the wire format.
pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to append the header and any owned bytes to.
    ///
    /// # Returns
    /// An optional borrowed slice that must be written right after `buf`, this lets
    /// big numeric payloads skip the copy into the buffer.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>>;
}
