use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::InferenceError;
use super::model::Classifier;
use super::preprocess::{PreparedTensor, TensorData};
use crate::config::ModelConfig;

/// ONNX Runtime classifier. `Session::run` needs exclusive access, so calls
/// are serialized on a mutex.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

fn build_session(config: &ModelConfig) -> ort::Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads.max(1))?
        .commit_from_file(&config.path)
}

fn backend_err(e: ort::Error) -> InferenceError {
    InferenceError::Backend(e.to_string())
}

impl OnnxClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let session = build_session(config).map_err(|e| {
            InferenceError::ModelUnavailable(format!(
                "failed to load ONNX model {}: {}",
                config.path.display(),
                e
            ))
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| InferenceError::ModelUnavailable("ONNX model has no inputs".into()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| InferenceError::ModelUnavailable("ONNX model has no outputs".into()))?;

        for input in &session.inputs {
            log::debug!("ONNX input '{}': {:?}", input.name, input.input_type);
        }
        log::info!(
            "ONNX model loaded (input '{}', output '{}')",
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn backend(&self) -> &'static str {
        "onnx"
    }

    fn forward(&self, tensor: &PreparedTensor) -> Result<Vec<f32>, InferenceError> {
        let input = match tensor.data() {
            TensorData::U8(a) => Tensor::from_array(a.clone()).map(|t| t.into_dyn()),
            TensorData::F32(a) => Tensor::from_array(a.clone()).map(|t| t.into_dyn()),
        }
        .map_err(backend_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Backend("ONNX session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(backend_err)?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::Backend(format!("output '{}' missing from results", self.output_name))
        })?;
        let scores = output.try_extract_array::<f32>().map_err(backend_err)?;
        Ok(scores.iter().copied().collect())
    }
}
