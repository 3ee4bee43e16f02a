use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayView4, Axis, Ix1, Ix2};
use ndarray_rand::RandomExt;
use rand::{Rng, seq::SliceRandom};
use rand_distr::Uniform;

use crate::{
    MlErr, Result,
    model::{Classifier, FitConfig, FitReport, ModelConfig},
};

/// The width of the hidden layer.
pub const HIDDEN_UNITS: usize = 32;

const LEARNING_RATE: f32 = 0.5;

/// A dense softmax classifier: flatten, one sigmoid hidden layer, softmax output,
/// trained with minibatch gradient descent on cross entropy.
///
/// The service treats the network topology as replaceable configuration; this is
/// the shipped topology behind the `Classifier` trait.
pub struct DenseClassifier {
    features: usize,
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
}

impl DenseClassifier {
    /// Creates a fresh instance with Xavier-uniform weights.
    ///
    /// # Arguments
    /// * `config` - The input shape and class count to build for.
    pub fn new(config: ModelConfig) -> Self {
        Self::with_rng(config, &mut rand::rng())
    }

    /// Creates a fresh instance drawing its initial weights from `rng`.
    ///
    /// # Arguments
    /// * `config` - The input shape and class count to build for.
    /// * `rng` - The random number generator for weight initialization.
    pub fn with_rng<R: Rng>(config: ModelConfig, rng: &mut R) -> Self {
        let features = config.features();
        let classes = config.num_classes;

        Self {
            features,
            w1: xavier((features, HIDDEN_UNITS), rng),
            b1: Array1::zeros(HIDDEN_UNITS),
            w2: xavier((HIDDEN_UNITS, classes), rng),
            b2: Array1::zeros(classes),
        }
    }

    /// Flattens a `(samples, rows, cols, channels)` batch into `(samples, features)`.
    fn flatten<'x>(&self, x: &'x ArrayView4<f32>) -> Result<ndarray::CowArray<'x, f32, Ix2>> {
        let (n, rows, cols, channels) = x.dim();
        let features = rows * cols * channels;

        if features != self.features {
            return Err(MlErr::SampleSizeMismatch {
                got: features,
                expected: self.features,
            });
        }

        // SAFETY: The element count is unchanged, only the axes are merged.
        Ok(x.to_shape((n, features)).unwrap())
    }

    /// Runs one forward pass, returning the hidden activations and the class
    /// probabilities.
    fn forward(&self, x: ArrayView2<f32>) -> (Array2<f32>, Array2<f32>) {
        let mut a1 = x.dot(&self.w1) + &self.b1;
        a1.mapv_inplace(sigmoid);

        let z2 = a1.dot(&self.w2) + &self.b2;
        (a1, softmax_rows(z2))
    }

    /// Performs one gradient descent step over a minibatch.
    ///
    /// # Returns
    /// The batch's cross-entropy loss before the step.
    fn train_batch(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let (a1, probs) = self.forward(x);
        let loss = cross_entropy(&probs, &y);
        let scale = 1.0 / x.nrows() as f32;

        let dz2 = (&probs - &y) * scale;
        let dw2 = a1.t().dot(&dz2);
        let db2 = dz2.sum_axis(Axis(0));

        let da1 = dz2.dot(&self.w2.t());
        let dz1 = da1 * &a1 * (1.0 - &a1);
        let dw1 = x.t().dot(&dz1);
        let db1 = dz1.sum_axis(Axis(0));

        self.w2.scaled_add(-LEARNING_RATE, &dw2);
        self.b2.scaled_add(-LEARNING_RATE, &db2);
        self.w1.scaled_add(-LEARNING_RATE, &dw1);
        self.b1.scaled_add(-LEARNING_RATE, &db1);

        loss
    }
}

impl Classifier for DenseClassifier {
    fn predict(&self, x: ArrayView4<f32>) -> Array2<f32> {
        // Shape violations can't happen here: the buffer decoded every sample
        // against the same side the model was configured with.
        let flat = self.flatten(&x).unwrap();
        let (_, probs) = self.forward(flat.view());
        probs
    }

    fn fit(&mut self, x: ArrayView4<f32>, y: &Array2<f32>, config: &FitConfig) -> Result<FitReport> {
        let flat = self.flatten(&x)?;
        let n = flat.nrows();
        if n == 0 {
            return Err(MlErr::EmptyTrainingSet);
        }

        let mut rng = rand::rng();

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        // Hold out the validation fraction, but never the whole set.
        let n_val = ((n as f32 * config.validation_split) as usize).min(n - 1);
        let (train_idx, val_idx) = indices.split_at(n - n_val);
        let mut train_idx = train_idx.to_vec();

        let mut report = FitReport {
            losses: Vec::new(),
            val_losses: Vec::new(),
        };

        let mut best = f32::INFINITY;
        let mut wait = 0;

        for _ in 0..config.max_epochs {
            train_idx.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            for chunk in train_idx.chunks(config.batch_size.get()) {
                let xb = flat.select(Axis(0), chunk);
                let yb = y.select(Axis(0), chunk);
                loss_sum += self.train_batch(xb.view(), yb.view()) * chunk.len() as f32;
            }

            let loss = loss_sum / train_idx.len() as f32;
            report.losses.push(loss);

            if !val_idx.is_empty() {
                let xv = flat.select(Axis(0), val_idx);
                let yv = y.select(Axis(0), val_idx);
                let (_, probs) = self.forward(xv.view());
                report.val_losses.push(cross_entropy(&probs, &yv.view()));
            }

            // Stop once the training loss stalls for `patience` epochs.
            if loss < best - config.min_delta {
                best = loss;
                wait = 0;
            } else {
                wait += 1;
                if wait >= config.patience {
                    break;
                }
            }
        }

        Ok(report)
    }

    fn weights(&self) -> Vec<ArrayD<f32>> {
        vec![
            self.w1.clone().into_dyn(),
            self.b1.clone().into_dyn(),
            self.w2.clone().into_dyn(),
            self.b2.clone().into_dyn(),
        ]
    }

    fn set_weights(&mut self, weights: &[ArrayD<f32>]) -> Result<()> {
        let expected: [&[usize]; 4] = [
            self.w1.shape(),
            self.b1.shape(),
            self.w2.shape(),
            self.b2.shape(),
        ];

        if weights.len() != expected.len() {
            return Err(MlErr::WeightCountMismatch {
                got: weights.len(),
                expected: expected.len(),
            });
        }

        // Validate everything first so a mismatch leaves the instance untouched.
        for (tensor, (weight, expected)) in weights.iter().zip(expected).enumerate() {
            if weight.shape() != expected {
                return Err(MlErr::WeightShapeMismatch {
                    tensor,
                    got: weight.shape().to_vec(),
                    expected: expected.to_vec(),
                });
            }
        }

        // SAFETY: The dimensionalities were checked just above.
        self.w1 = weights[0].clone().into_dimensionality::<Ix2>().unwrap();
        self.b1 = weights[1].clone().into_dimensionality::<Ix1>().unwrap();
        self.w2 = weights[2].clone().into_dimensionality::<Ix2>().unwrap();
        self.b2 = weights[3].clone().into_dimensionality::<Ix1>().unwrap();

        Ok(())
    }
}

fn xavier<R: Rng>(dim: (usize, usize), rng: &mut R) -> Array2<f32> {
    let range = (6.0 / (dim.0 + dim.1) as f32).sqrt();

    // SAFETY: This range is always valid.
    Array2::random_using(dim, Uniform::new(-range, range).unwrap(), rng)
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

fn softmax_rows(mut z: Array2<f32>) -> Array2<f32> {
    for mut row in z.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |max, &v| max.max(v));
        row.mapv_inplace(|v| (v - max).exp());

        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    z
}

fn cross_entropy(probs: &Array2<f32>, y: &ArrayView2<f32>) -> f32 {
    const EPS: f32 = 1e-7;

    let mut sum = 0.0;
    for (&p, &target) in probs.iter().zip(y.iter()) {
        sum -= target * p.max(EPS).ln();
    }

    sum / probs.nrows() as f32
}
