use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SampleSizeMismatch {
        got: usize,
        expected: usize,
    },
    EmptyTrainingSet,
    EmptyPredictBatch,
    LabelOutOfRange {
        label: u32,
        num_classes: usize,
    },
    WeightCountMismatch {
        got: usize,
        expected: usize,
    },
    WeightShapeMismatch {
        tensor: usize,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SampleSizeMismatch { got, expected } => format!(
                "There's a size mismatch in the raw sample, got {got} bytes and expected {expected}"
            ),
            MlErr::EmptyTrainingSet => {
                "Tried to drain the training buffer with zero buffered samples".to_string()
            }
            MlErr::EmptyPredictBatch => {
                "Tried to drain the predict buffer with zero buffered samples".to_string()
            }
            MlErr::LabelOutOfRange { label, num_classes } => {
                format!("The label {label} is out of range for {num_classes} classes")
            }
            MlErr::WeightCountMismatch { got, expected } => format!(
                "The given weight set has {got} tensors, the model expects {expected}"
            ),
            MlErr::WeightShapeMismatch {
                tensor,
                got,
                expected,
            } => format!(
                "The {tensor}-th weight tensor has shape {got:?}, the model expects {expected:?}"
            ),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {}
