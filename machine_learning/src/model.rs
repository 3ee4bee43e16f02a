use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayD, ArrayView4};

use crate::{MlErr, Result, sample::CHANNELS};

/// The immutable configuration of a model instance.
///
/// Changing any of these fields means discarding the instance and building a
/// fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    pub side: usize,
    pub channels: usize,
    pub num_classes: usize,
}

impl ModelConfig {
    /// Creates a square `ModelConfig` with the default channel count.
    ///
    /// # Arguments
    /// * `side` - The side length of the input samples.
    /// * `num_classes` - The amount of output classes.
    pub fn square(side: usize, num_classes: usize) -> Self {
        Self {
            side,
            channels: CHANNELS,
            num_classes,
        }
    }

    /// Returns the expected `(rows, cols, channels)` shape of a single sample.
    pub fn input_shape(&self) -> (usize, usize, usize) {
        (self.side, self.side, self.channels)
    }

    /// Returns the flattened feature count of a single sample.
    pub fn features(&self) -> usize {
        self.side * self.side * self.channels
    }
}

/// The training policy for a single `fit` call.
#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub batch_size: NonZeroUsize,
    pub max_epochs: usize,
    pub validation_split: f32,
    pub patience: usize,
    pub min_delta: f32,
}

impl Default for FitConfig {
    /// Batches of 100, an epoch ceiling of 100, a 10% held-out validation
    /// fraction and early stopping on training loss once 5 consecutive epochs
    /// improve by less than 0.01.
    fn default() -> Self {
        Self {
            // SAFETY: 100 is non zero.
            batch_size: NonZeroUsize::new(100).unwrap(),
            max_epochs: 100,
            validation_split: 0.1,
            patience: 5,
            min_delta: 0.01,
        }
    }
}

/// The outcome of a `fit` call, for observability only.
#[derive(Debug)]
pub struct FitReport {
    /// Mean training loss per completed epoch.
    pub losses: Vec<f32>,
    /// Validation loss per completed epoch, empty when no samples were held out.
    pub val_losses: Vec<f32>,
}

impl FitReport {
    /// Returns the amount of completed epochs.
    pub fn epochs(&self) -> usize {
        self.losses.len()
    }
}

/// An opaque classifier collaborator.
///
/// The service never looks inside: it only needs batched inference, fitting,
/// and a flat list of weight tensors to persist and restore.
pub trait Classifier {
    /// Runs inference over a `(samples, rows, cols, channels)` batch.
    ///
    /// # Returns
    /// A `(samples, num_classes)` score matrix, one row per input sample.
    fn predict(&self, x: ArrayView4<f32>) -> Array2<f32>;

    /// Trains the instance against `(x, y)` under the given policy.
    ///
    /// # Arguments
    /// * `x` - The `(samples, rows, cols, channels)` input batch.
    /// * `y` - The `(samples, num_classes)` one-hot label matrix.
    /// * `config` - The batching and early-stopping policy.
    fn fit(&mut self, x: ArrayView4<f32>, y: &Array2<f32>, config: &FitConfig) -> Result<FitReport>;

    /// Returns the instance's weight tensors in a fixed order.
    fn weights(&self) -> Vec<ArrayD<f32>>;

    /// Replaces the instance's weights with a previously captured set.
    ///
    /// # Returns
    /// An error when the tensor count or any tensor shape doesn't match the
    /// instance's topology; the instance is left untouched in that case.
    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()>;
}

/// One-hot encodes class indices into a `(samples, num_classes)` matrix.
///
/// # Arguments
/// * `labels` - The class index per sample.
/// * `num_classes` - The amount of columns of the output.
///
/// # Returns
/// The encoded matrix, or `MlErr::LabelOutOfRange` if any index doesn't fit.
pub fn one_hot(labels: &[u32], num_classes: usize) -> Result<Array2<f32>> {
    let mut encoded = Array2::zeros((labels.len(), num_classes));

    for (row, &label) in labels.iter().enumerate() {
        if label as usize >= num_classes {
            return Err(MlErr::LabelOutOfRange { label, num_classes });
        }

        encoded[(row, label as usize)] = 1.0;
    }

    Ok(encoded)
}
