pub trait Serialize<'a> {
    /// Serializes `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The destination buffer for the fixed-size part of the message.
    ///
    /// # Returns
    /// An optional tail slice that the sender writes after `buf` without copying it.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
