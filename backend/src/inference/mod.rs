pub mod labels;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod ranking;
pub mod resize;
#[cfg(feature = "torch")]
pub mod torch;

use std::sync::Arc;

use labels::ClassLabels;
use model::Classifier;
use preprocess::{PreparedTensor, Preprocessor};
use ranking::{PredictionResult, Ranker};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Model not loaded. {0}")]
    ModelUnavailable(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Model inference error: {0}")]
    Backend(String),
}

/// Load-once prediction state: the pipeline, the classifier (if it loaded)
/// and the ranking engine. Cheap to clone.
#[derive(Clone)]
pub struct InferenceService {
    preprocessor: Arc<Preprocessor>,
    classifier: Option<Arc<dyn Classifier>>,
    ranker: Arc<Ranker>,
}

impl InferenceService {
    pub fn new(
        preprocessor: Preprocessor,
        classifier: Option<Arc<dyn Classifier>>,
        ranker: Ranker,
    ) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
            classifier,
            ranker: Arc::new(ranker),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn labels(&self) -> &ClassLabels {
        self.ranker.labels()
    }

    fn classifier(&self) -> Result<&Arc<dyn Classifier>, InferenceError> {
        self.classifier.as_ref().ok_or_else(|| {
            InferenceError::ModelUnavailable("Please fix the model file.".to_string())
        })
    }

    pub fn ensure_ready(&self) -> Result<(), InferenceError> {
        self.classifier().map(|_| ())
    }

    /// Runs the classifier once on an all-zero tensor and checks that its
    /// output length matches the label manifest.
    pub fn verify(&self) -> Result<(), InferenceError> {
        let classifier = self.classifier()?;
        let probe = PreparedTensor::zeros(self.preprocessor.policy());
        let output = classifier.forward(&probe)?;
        if output.len() != self.labels().len() {
            return Err(InferenceError::Configuration(format!(
                "{} classifier produces {} outputs but the label manifest has {} classes",
                classifier.backend(),
                output.len(),
                self.labels().len()
            )));
        }
        log::info!(
            "Model probe ok: {} outputs match {} labels",
            output.len(),
            self.labels().len()
        );
        Ok(())
    }

    pub fn predict(&self, image: &[u8]) -> Result<PredictionResult, InferenceError> {
        let classifier = self.classifier()?;
        let tensor = self.preprocessor.prepare(image)?;
        log::debug!("Prepared tensor {:?} ({:?})", tensor.shape(), tensor.policy());
        let raw = classifier.forward(&tensor)?;
        log::debug!(
            "Raw output: len={}, sum={:.6}, max={:.6}, min={:.6}",
            raw.len(),
            raw.iter().sum::<f32>(),
            raw.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            raw.iter().copied().fold(f32::INFINITY, f32::min)
        );
        self.ranker.rank(&raw)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{PreprocessingConfig, RankingConfig};
    use std::sync::Mutex;

    /// Classifier double returning a fixed vector and recording the tensors it saw.
    pub struct FixedClassifier {
        pub output: Vec<f32>,
        pub seen_shapes: Mutex<Vec<Vec<usize>>>,
    }

    impl FixedClassifier {
        pub fn new(output: Vec<f32>) -> Self {
            Self {
                output,
                seen_shapes: Mutex::new(Vec::new()),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn backend(&self) -> &'static str {
            "fixed"
        }

        fn forward(&self, tensor: &PreparedTensor) -> Result<Vec<f32>, InferenceError> {
            self.seen_shapes.lock().unwrap().push(tensor.shape().to_vec());
            Ok(self.output.clone())
        }
    }

    pub fn labels(n: usize) -> ClassLabels {
        ClassLabels::new((0..n).map(|i| format!("class_{}", i)).collect()).unwrap()
    }

    pub fn service(classifier: Option<Arc<dyn Classifier>>, n_labels: usize) -> InferenceService {
        InferenceService::new(
            Preprocessor::new(PreprocessingConfig::default()),
            classifier,
            Ranker::new(RankingConfig::default(), Arc::new(labels(n_labels))),
        )
    }

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }
}
