use ndarray::Array3;

use crate::{MlErr, Result};

/// The amount of color channels per pixel.
pub const CHANNELS: usize = 3;

/// Decodes a raw byte sequence into a normalized `(side, side, CHANNELS)` pixel grid.
///
/// Walks the bytes in row-major order with a stride of `CHANNELS`, mapping each
/// channel intensity from `0..=255` into `[0.0, 1.0]`.
///
/// # Arguments
/// * `raw` - The raw pixel bytes, exactly `side * side * CHANNELS` of them.
/// * `side` - The side length of the square sample grid.
///
/// # Returns
/// The decoded sample, or `MlErr::SampleSizeMismatch` if `raw` has the wrong length.
pub fn decode(raw: &[u8], side: usize) -> Result<Array3<f32>> {
    let expected = side * side * CHANNELS;
    if raw.len() != expected {
        return Err(MlErr::SampleSizeMismatch {
            got: raw.len(),
            expected,
        });
    }

    let pixels = raw.iter().map(|&byte| byte as f32 / 255.0).collect();

    // SAFETY: The length check above guarantees the shape holds exactly.
    Ok(Array3::from_shape_vec((side, side, CHANNELS), pixels).unwrap())
}
