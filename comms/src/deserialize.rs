use std::io;

pub trait Deserialize<'a>: Sized {
    /// Deserializes a value out of `buf`.
    ///
    /// # Arguments
    /// * `buf` - The raw payload of a single frame, header included.
    ///
    /// # Returns
    /// The deserialized value, whose lifetime is tied to `buf`.
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
