pub mod buffer;
pub mod classifier;
pub mod error;
pub mod model;
pub mod sample;

pub use error::{MlErr, Result};
