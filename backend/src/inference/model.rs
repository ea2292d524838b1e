use std::sync::Arc;

use super::InferenceError;
use super::preprocess::PreparedTensor;
use crate::config::{ModelBackend, ModelConfig};

/// A loaded classifier artifact: one forward pass per prepared tensor,
/// returning one score per class. Implementations are shared across request
/// handlers and must tolerate concurrent calls.
pub trait Classifier: Send + Sync {
    fn backend(&self) -> &'static str;

    fn forward(&self, tensor: &PreparedTensor) -> Result<Vec<f32>, InferenceError>;
}

pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn Classifier>, InferenceError> {
    if !config.path.exists() {
        return Err(InferenceError::ModelUnavailable(format!(
            "model file not found: {}",
            config.path.display()
        )));
    }

    log::info!(
        "Loading {} classifier from {}",
        config.backend,
        config.path.display()
    );

    match config.backend {
        #[cfg(feature = "onnx")]
        ModelBackend::Onnx => Ok(Arc::new(super::onnx::OnnxClassifier::load(config)?)),
        #[cfg(feature = "torch")]
        ModelBackend::Torch => Ok(Arc::new(super::torch::TorchClassifier::load(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(InferenceError::ModelUnavailable(format!(
            "this build has no {} backend; rebuild with `--features {}`",
            other, other
        ))),
    }
}
