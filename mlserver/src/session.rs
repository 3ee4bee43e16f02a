use std::time::Instant;

use log::{debug, info, warn};
use machine_learning::{
    buffer::{PredictBuffer, TrainingBuffer},
    classifier::DenseClassifier,
    model::{Classifier, FitConfig, FitReport, ModelConfig, one_hot},
};

use crate::{Result, ServerErr, store::WeightStore};

/// The amount of output classes of the service's classifier.
pub const NUM_CLASSES: usize = 2;

/// The class whose score becomes the scalar prediction signal.
const POSITIVE_CLASS: usize = 1;

/// The lifecycle of the single in-process model instance and its buffers.
///
/// All operations before `init_params` fail with `ServerErr::NotConfigured`;
/// afterwards the session owns at most one live model, built lazily on the
/// first predict or rebuilt from scratch on every train.
pub struct Session {
    store: WeightStore,
    state: State,
}

enum State {
    Unconfigured,
    Configured(Box<Configured>),
}

struct Configured {
    config: ModelConfig,
    training: TrainingBuffer,
    predict: PredictBuffer,
    model: Option<Box<dyn Classifier + Send>>,
}

impl State {
    fn configured_mut(&mut self) -> Result<&mut Configured> {
        match self {
            State::Unconfigured => Err(ServerErr::NotConfigured),
            State::Configured(configured) => Ok(configured),
        }
    }
}

impl Session {
    /// Creates a new unconfigured `Session`.
    ///
    /// # Arguments
    /// * `store` - The weight artifact storage.
    pub fn new(store: WeightStore) -> Self {
        Self {
            store,
            state: State::Unconfigured,
        }
    }

    /// Fixes the sample shape and resets all buffers.
    ///
    /// Any live model instance is discarded: its topology was built for the
    /// previous configuration.
    ///
    /// # Arguments
    /// * `sample_size` - The side length of every sample from here on.
    pub fn init_params(&mut self, sample_size: usize) {
        let config = ModelConfig::square(sample_size, NUM_CLASSES);
        info!("sample parameters set: input shape {:?}", config.input_shape());

        self.state = State::Configured(Box::new(Configured {
            config,
            training: TrainingBuffer::new(sample_size),
            predict: PredictBuffer::new(sample_size),
            model: None,
        }));
    }

    /// Buffers one training sample.
    ///
    /// # Arguments
    /// * `pixels` - The raw pixel bytes of the sample.
    /// * `label` - The class index of the sample.
    pub fn append_training(&mut self, pixels: &[u8], label: u32) -> Result<()> {
        let configured = self.state.configured_mut()?;
        configured.training.push(pixels, label)?;
        Ok(())
    }

    /// Buffers one sample for the next predict pass.
    ///
    /// # Arguments
    /// * `pixels` - The raw pixel bytes of the sample.
    pub fn append_predict(&mut self, pixels: &[u8]) -> Result<()> {
        let configured = self.state.configured_mut()?;
        configured.predict.push(pixels)?;
        Ok(())
    }

    /// Trains a fresh model instance on everything buffered so far.
    ///
    /// The instance always starts from initialized weights, never resuming a
    /// persisted set. On success the weights are persisted for the current
    /// configuration and the instance replaces any previous one; on failure the
    /// previous instance and artifact stay untouched.
    ///
    /// # Returns
    /// The fit report, or an error when the buffer is empty, a label is out of
    /// range, or persisting fails.
    pub fn train(&mut self) -> Result<FitReport> {
        let Self { store, state } = self;
        let configured = state.configured_mut()?;

        let (x, labels) = configured.training.drain()?;
        let y = one_hot(&labels, configured.config.num_classes)?;
        debug!(samples = x.dim().0; "training buffer drained");

        let mut model = build_model(configured.config);
        let report = model.fit(x.view(), &y, &FitConfig::default())?;
        store.save(&configured.config, &model.weights())?;

        configured.model = Some(model);
        Ok(report)
    }

    /// Runs one batched inference pass over the queued predict samples.
    ///
    /// Builds a model lazily when none is live, restoring persisted weights for
    /// the current configuration if a usable artifact exists; an unusable one
    /// is skipped with a log line and the fresh initialization stands. The
    /// predict buffer is drained for the next cycle.
    ///
    /// # Returns
    /// One byte per queued sample, in queue order: the positive-class score
    /// scaled by 255 and rounded up.
    pub fn predict(&mut self) -> Result<Vec<u8>> {
        let Self { store, state } = self;
        let configured = state.configured_mut()?;

        if configured.model.is_none() {
            configured.model = Some(restore_or_fresh(store, configured.config));
        }

        // SAFETY: Ensured just above.
        let model = configured.model.as_ref().unwrap();

        let (x, load_time) = configured.predict.drain()?;
        if let Some(load_time) = load_time {
            info!("samples load time: {load_time:?}");
        }

        let start = Instant::now();
        let scores = model.predict(x.view());
        info!("predict time: {:?}", start.elapsed());

        let bytes = scores
            .column(POSITIVE_CLASS)
            .iter()
            .map(|&score| (score * 255.0).ceil().clamp(0.0, 255.0) as u8)
            .collect();

        Ok(bytes)
    }
}

fn build_model(config: ModelConfig) -> Box<dyn Classifier + Send> {
    Box::new(DenseClassifier::new(config))
}

/// Builds a fresh model and tries to restore the persisted weights for
/// `config` into it.
///
/// Restoration failures are tolerated: a missing, unreadable or
/// shape-mismatched artifact leaves the fresh initialization in place.
fn restore_or_fresh(store: &WeightStore, config: ModelConfig) -> Box<dyn Classifier + Send> {
    let mut model = build_model(config);

    match store.load(&config) {
        Ok(Some(weights)) => match model.set_weights(&weights) {
            Ok(()) => info!("restored persisted weights"),
            Err(e) => warn!("skipping persisted weights: {e}"),
        },
        Ok(None) => debug!("no persisted weights for this configuration"),
        Err(e) => warn!("skipping persisted weights: {e}"),
    }

    model
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use machine_learning::MlErr;

    use super::*;

    fn test_session(tag: &str) -> Session {
        let dir = env::temp_dir().join(format!("mlserver-session-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        Session::new(WeightStore::new(dir))
    }

    fn raw_sample(side: usize, value: u8) -> Vec<u8> {
        vec![value; side * side * 3]
    }

    #[test]
    fn test_operations_require_init() {
        let mut session = test_session("uninit");
        let pixels = raw_sample(4, 1);

        assert!(matches!(
            session.append_training(&pixels, 0),
            Err(ServerErr::NotConfigured)
        ));
        assert!(matches!(
            session.append_predict(&pixels),
            Err(ServerErr::NotConfigured)
        ));
        assert!(matches!(session.train(), Err(ServerErr::NotConfigured)));
        assert!(matches!(session.predict(), Err(ServerErr::NotConfigured)));
    }

    #[test]
    fn test_train_with_zero_samples_fails() {
        let mut session = test_session("zero");
        session.init_params(4);

        assert!(matches!(
            session.train(),
            Err(ServerErr::Ml(MlErr::EmptyTrainingSet))
        ));
    }

    #[test]
    fn test_init_resets_buffered_samples() {
        let mut session = test_session("reset");
        session.init_params(4);
        session.append_training(&raw_sample(4, 9), 1).unwrap();

        // A fresh configuration starts from empty buffers.
        session.init_params(4);
        assert!(matches!(
            session.train(),
            Err(ServerErr::Ml(MlErr::EmptyTrainingSet))
        ));
    }

    #[test]
    fn test_out_of_range_label_fails_train() {
        let mut session = test_session("label");
        session.init_params(4);
        session
            .append_training(&raw_sample(4, 200), NUM_CLASSES as u32)
            .unwrap();

        assert!(matches!(
            session.train(),
            Err(ServerErr::Ml(MlErr::LabelOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_train_then_immediate_retrain_fails_on_empty_buffer() {
        let mut session = test_session("drain");
        session.init_params(2);

        for i in 0..10 {
            session
                .append_training(&raw_sample(2, (i * 25) as u8), i % 2)
                .unwrap();
        }

        session.train().unwrap();

        // Training consumed and reset the buffers.
        assert!(matches!(
            session.train(),
            Err(ServerErr::Ml(MlErr::EmptyTrainingSet))
        ));
    }

    #[test]
    fn test_predict_returns_one_byte_per_sample() {
        let mut session = test_session("bytes");
        session.init_params(4);

        session.append_predict(&raw_sample(4, 255)).unwrap();
        let bytes = session.predict().unwrap();
        assert_eq!(bytes.len(), 1);

        for value in [0, 50, 100, 150, 200] {
            session.append_predict(&raw_sample(4, value)).unwrap();
        }
        let bytes = session.predict().unwrap();
        assert_eq!(bytes.len(), 5);

        // Drained: a third call has nothing queued.
        assert!(matches!(
            session.predict(),
            Err(ServerErr::Ml(MlErr::EmptyPredictBatch))
        ));
    }
}
