use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::model::ModelConfig;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, ServerErr};

/// On-disk storage for weight artifacts, one safetensors file per model
/// configuration.
///
/// The artifact is opaque to callers: a flat ordered list of F32 tensors keyed
/// by position. Writes are whole-file and blocking, with no partial-write
/// recovery.
pub struct WeightStore {
    dir: PathBuf,
}

impl WeightStore {
    /// Creates a new `WeightStore`.
    ///
    /// # Arguments
    /// * `dir` - The directory the artifacts live in.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the artifact path for the given model configuration.
    pub fn path_for(&self, config: &ModelConfig) -> PathBuf {
        let (rows, cols, channels) = config.input_shape();
        let classes = config.num_classes;

        self.dir.join(format!(
            "mlserver_weights_{rows}x{cols}x{channels}_cls{classes}.safetensors"
        ))
    }

    /// Persists a weight set for `config`, overwriting any prior artifact.
    ///
    /// # Arguments
    /// * `config` - The configuration the weights belong to.
    /// * `weights` - The flat ordered list of weight tensors.
    pub fn save(&self, config: &ModelConfig, weights: &[ArrayD<f32>]) -> Result<()> {
        let path = self.path_for(config);

        let buffers: Vec<Vec<u8>> = weights
            .iter()
            .map(|weight| {
                let standard = weight.as_standard_layout();

                // SAFETY: A standard layout array is always contiguous.
                bytemuck::cast_slice(standard.as_slice().unwrap()).to_vec()
            })
            .collect();

        let mut views = Vec::with_capacity(weights.len());
        for (i, (weight, buffer)) in weights.iter().zip(&buffers).enumerate() {
            let view = TensorView::new(Dtype::F32, weight.shape().to_vec(), buffer)
                .map_err(|e| Self::artifact_err(&path, e))?;

            views.push((i.to_string(), view));
        }

        let bytes = safetensors::serialize(views, &None).map_err(|e| Self::artifact_err(&path, e))?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, bytes)?;

        debug!("persisted weight artifact at {}", path.display());
        Ok(())
    }

    /// Loads the weight set persisted for `config`, if any.
    ///
    /// # Returns
    /// `Ok(None)` when no artifact exists for this configuration, the decoded
    /// tensors when one does, or an error when the artifact can't be decoded.
    pub fn load(&self, config: &ModelConfig) -> Result<Option<Vec<ArrayD<f32>>>> {
        let path = self.path_for(config);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let tensors = SafeTensors::deserialize(&bytes).map_err(|e| Self::artifact_err(&path, e))?;

        let mut weights = Vec::with_capacity(tensors.len());
        for i in 0..tensors.len() {
            let view = tensors
                .tensor(&i.to_string())
                .map_err(|e| Self::artifact_err(&path, e))?;

            if view.dtype() != Dtype::F32 {
                return Err(ServerErr::Store {
                    path,
                    detail: format!("tensor {i} has dtype {:?}, expected F32", view.dtype()),
                });
            }

            // `pod_collect_to_vec` copies, so the file bytes don't need to be
            // f32 aligned.
            let data: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
            let weight = ArrayD::from_shape_vec(IxDyn(view.shape()), data)
                .map_err(|e| Self::artifact_err(&path, e))?;

            weights.push(weight);
        }

        Ok(Some(weights))
    }

    fn artifact_err(path: &Path, detail: impl ToString) -> ServerErr {
        ServerErr::Store {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use ndarray::{ArrayD, IxDyn};

    use super::*;

    fn temp_store(tag: &str) -> WeightStore {
        let dir = env::temp_dir().join(format!("mlserver-store-{tag}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        WeightStore::new(dir)
    }

    fn some_weights() -> Vec<ArrayD<f32>> {
        vec![
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
            ArrayD::from_shape_vec(IxDyn(&[3]), vec![-1.0, 0.0, 1.0]).unwrap(),
        ]
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = temp_store("roundtrip");
        let config = ModelConfig::square(2, 2);
        let weights = some_weights();

        store.save(&config, &weights).unwrap();
        let loaded = store.load(&config).unwrap().unwrap();

        assert_eq!(loaded, weights);
    }

    #[test]
    fn test_save_creates_missing_directory() {
        let dir = env::temp_dir()
            .join(format!("mlserver-store-fresh-{}", std::process::id()))
            .join("nested");
        let _ = fs::remove_dir_all(&dir);
        let store = WeightStore::new(&dir);
        let config = ModelConfig::square(2, 2);
        let weights = some_weights();

        store.save(&config, &weights).unwrap();

        assert_eq!(store.load(&config).unwrap().unwrap(), weights);
    }

    #[test]
    fn test_load_missing_artifact_is_none() {
        let store = temp_store("missing");
        let config = ModelConfig::square(31, 2);
        let _ = fs::remove_file(store.path_for(&config));

        assert!(store.load(&config).unwrap().is_none());
    }

    #[test]
    fn test_artifacts_are_keyed_by_configuration() {
        let store = temp_store("keys");
        let small = ModelConfig::square(4, 2);
        let big = ModelConfig::square(8, 2);

        assert_ne!(store.path_for(&small), store.path_for(&big));

        let _ = fs::remove_file(store.path_for(&big));
        store.save(&small, &some_weights()).unwrap();
        assert!(store.load(&big).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_artifact_is_an_error() {
        let store = temp_store("corrupt");
        let config = ModelConfig::square(3, 2);
        fs::write(store.path_for(&config), b"garbage").unwrap();

        assert!(matches!(
            store.load(&config),
            Err(ServerErr::Store { .. })
        ));
    }
}
