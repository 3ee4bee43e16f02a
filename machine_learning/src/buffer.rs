use std::time::{Duration, Instant};

use ndarray::{Array3, Array4, Axis, concatenate, stack};

use crate::{MlErr, Result, sample};

/// The amount of staged samples that triggers a bulk merge.
///
/// Staging bounds per-call cost: appends land in a plain vec and only every
/// `STAGING_LIMIT` calls pay for the bulk tensor concatenation.
pub const STAGING_LIMIT: usize = 1000;

/// Accumulates decoded training samples and their labels until a training pass
/// drains them.
///
/// The label vec always covers both tiers: `labels.len()` equals the staged
/// sample count plus the bulk sample count.
pub struct TrainingBuffer {
    side: usize,
    staging: Vec<Array3<f32>>,
    bulk: Option<Array4<f32>>,
    labels: Vec<u32>,
}

impl TrainingBuffer {
    /// Creates a new empty `TrainingBuffer`.
    ///
    /// # Arguments
    /// * `side` - The side length every pushed sample must decode against.
    pub fn new(side: usize) -> Self {
        Self {
            side,
            staging: Vec::new(),
            bulk: None,
            labels: Vec::new(),
        }
    }

    /// Decodes and buffers one training sample with its label.
    ///
    /// # Arguments
    /// * `raw` - The raw pixel bytes of the sample.
    /// * `label` - The class index of the sample.
    ///
    /// # Returns
    /// An error if the raw bytes don't match the configured side length.
    pub fn push(&mut self, raw: &[u8], label: u32) -> Result<()> {
        let sample = sample::decode(raw, self.side)?;
        self.staging.push(sample);

        if self.staging.len() == STAGING_LIMIT {
            self.flush_staging();
        }

        self.labels.push(label);
        Ok(())
    }

    /// Returns the total amount of buffered samples, staged or flushed.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the amount of samples still sitting in the staging tier.
    pub fn staged(&self) -> usize {
        self.staging.len()
    }

    /// Flushes any staged samples and hands over the full `(samples, rows, cols,
    /// channels)` batch with its labels, leaving the buffer empty.
    ///
    /// # Returns
    /// The batch and labels, or `MlErr::EmptyTrainingSet` when nothing was buffered.
    pub fn drain(&mut self) -> Result<(Array4<f32>, Vec<u32>)> {
        if !self.staging.is_empty() {
            self.flush_staging();
        }

        let bulk = self.bulk.take().ok_or(MlErr::EmptyTrainingSet)?;
        let labels = std::mem::take(&mut self.labels);
        Ok((bulk, labels))
    }

    fn flush_staging(&mut self) {
        let views: Vec<_> = self.staging.iter().map(|a| a.view()).collect();

        // SAFETY: every staged sample went through `decode` with the same side,
        //         so all views share one shape.
        let batch = stack(Axis(0), &views).unwrap();
        self.staging.clear();

        self.bulk = Some(match self.bulk.take() {
            None => batch,
            Some(bulk) => concatenate(Axis(0), &[bulk.view(), batch.view()]).unwrap(),
        });
    }
}

/// Accumulates decoded samples awaiting a single batched inference pass.
///
/// Predict batches are small, so samples go straight into one tier. The buffer
/// remembers when the first sample of the current cycle arrived so the caller
/// can report the total load time.
pub struct PredictBuffer {
    side: usize,
    samples: Vec<Array3<f32>>,
    first_push: Option<Instant>,
}

impl PredictBuffer {
    /// Creates a new empty `PredictBuffer`.
    ///
    /// # Arguments
    /// * `side` - The side length every pushed sample must decode against.
    pub fn new(side: usize) -> Self {
        Self {
            side,
            samples: Vec::new(),
            first_push: None,
        }
    }

    /// Decodes and buffers one sample for the next inference pass.
    ///
    /// # Arguments
    /// * `raw` - The raw pixel bytes of the sample.
    ///
    /// # Returns
    /// An error if the raw bytes don't match the configured side length.
    pub fn push(&mut self, raw: &[u8]) -> Result<()> {
        let sample = sample::decode(raw, self.side)?;
        self.first_push.get_or_insert_with(Instant::now);
        self.samples.push(sample);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hands over the queued `(samples, rows, cols, channels)` batch and resets
    /// the buffer for the next cycle.
    ///
    /// # Returns
    /// The batch and the time since the cycle's first push, or
    /// `MlErr::EmptyPredictBatch` when nothing was buffered.
    pub fn drain(&mut self) -> Result<(Array4<f32>, Option<Duration>)> {
        if self.samples.is_empty() {
            return Err(MlErr::EmptyPredictBatch);
        }

        let views: Vec<_> = self.samples.iter().map(|a| a.view()).collect();

        // SAFETY: same invariant as the training buffer, one shape for all views.
        let batch = stack(Axis(0), &views).unwrap();
        self.samples.clear();

        let load_time = self.first_push.take().map(|start| start.elapsed());
        Ok((batch, load_time))
    }
}
