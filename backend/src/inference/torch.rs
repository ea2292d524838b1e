use std::sync::Mutex;

use tch::{CModule, Device, Kind, TchError, Tensor};

use super::InferenceError;
use super::model::Classifier;
use super::preprocess::{PreparedTensor, TensorData};
use crate::config::ModelConfig;

/// TorchScript classifier. `CModule` is not `Sync`, hence the mutex.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
}

fn backend_err(e: TchError) -> InferenceError {
    InferenceError::Backend(e.to_string())
}

impl TorchClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(&config.path, device).map_err(|e| {
            InferenceError::ModelUnavailable(format!(
                "failed to load TorchScript model {}: {}",
                config.path.display(),
                e
            ))
        })?;
        log::info!("TorchScript model loaded on {:?}", device);
        Ok(Self {
            model: Mutex::new(model),
            device,
        })
    }
}

impl Classifier for TorchClassifier {
    fn backend(&self) -> &'static str {
        "torch"
    }

    fn forward(&self, tensor: &PreparedTensor) -> Result<Vec<f32>, InferenceError> {
        let not_contiguous = || InferenceError::Backend("input tensor is not contiguous".into());
        let input = match tensor.data() {
            TensorData::U8(a) => Tensor::from_slice(a.as_slice().ok_or_else(not_contiguous)?),
            TensorData::F32(a) => Tensor::from_slice(a.as_slice().ok_or_else(not_contiguous)?),
        };
        let shape = tensor.shape();
        let input = input
            .f_view([shape[0] as i64, shape[1] as i64, shape[2] as i64, shape[3] as i64])
            .map_err(backend_err)?
            .to_device(self.device);

        let model = self
            .model
            .lock()
            .map_err(|_| InferenceError::Backend("TorchScript module lock poisoned".into()))?;
        let output = tch::no_grad(|| model.forward_ts(&[input])).map_err(backend_err)?;

        let flat = output
            .to_device(Device::Cpu)
            .f_to_kind(Kind::Float)
            .and_then(|t| t.f_view([-1i64]))
            .map_err(backend_err)?;
        Vec::<f32>::try_from(&flat).map_err(backend_err)
    }
}
