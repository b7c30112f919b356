use std::path::Path;

use tract_onnx::prelude::*;
use tracing::info;

use super::preprocess::ImageTensor;

/// A loaded network treated as an opaque `predict(tensor) -> outputs` function.
///
/// Implementations must not mutate shared state in `predict`; one instance
/// serves concurrent requests.
pub trait Model: Send + Sync {
    fn predict(&self, input: &ImageTensor) -> anyhow::Result<Vec<f32>>;
}

/// ONNX export of a Keras network, pinned to the `[1, 224, 224, 1]` f32 input.
pub struct OnnxModel {
    plan: TypedRunnableModel<TypedModel>,
}

impl OnnxModel {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let plan = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, f32::fact(ImageTensor::shape()).into())?
            .into_optimized()?
            .into_runnable()?;
        info!(path = %path.display(), "model loaded");
        Ok(Self { plan })
    }
}

impl Model for OnnxModel {
    fn predict(&self, input: &ImageTensor) -> anyhow::Result<Vec<f32>> {
        let [n, h, w, c] = ImageTensor::shape();
        let tensor: Tensor =
            tract_ndarray::Array4::from_shape_vec((n, h, w, c), input.as_slice().to_vec())?.into();
        let outputs = self.plan.run(tvec!(tensor.into()))?;
        let first = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model returned no outputs"))?;
        let view = first.to_array_view::<f32>()?;
        Ok(view.iter().copied().collect())
    }
}
