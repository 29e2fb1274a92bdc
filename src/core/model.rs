//! Model handle types and ONNX Runtime execution.
//!
//! This module defines the opaque model handle produced by the cache: a
//! callable prediction runtime, the input spec resolved once at load time,
//! and the optional label metadata aligned with the model's output channels.

use crate::core::config::DEFAULT_INPUT_SIZE;
use crate::core::errors::ClassificationError;
use crate::core::tensor::{Tensor2D, Tensor4D};
use ort::{session::Session, value::TensorRef};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Ordered label strings, index-aligned with the model's output channels.
///
/// Deserialized from the metadata JSON, which carries at least a `labels`
/// field. Extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMetadata {
    /// Label for each output channel, in channel order.
    pub labels: Vec<String>,
}

/// Input spec resolved once when the model is loaded.
///
/// Replaces per-prediction shape probing: the declared spatial size is read
/// from the model's input shape descriptor at load time, falling back to
/// [`DEFAULT_INPUT_SIZE`] when the model exposes no usable shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInputSpec {
    /// Spatial edge length the model expects (input is `spatial_size x spatial_size`).
    pub spatial_size: u32,
}

impl Default for ModelInputSpec {
    fn default() -> Self {
        Self {
            spatial_size: DEFAULT_INPUT_SIZE,
        }
    }
}

impl ModelInputSpec {
    /// Resolves the spec from a declared input shape descriptor.
    ///
    /// The spatial size is the second dimension of the descriptor (NHWC
    /// layout); dynamic or missing dimensions fall back to the default.
    pub fn from_declared_shape(dims: Option<&[i64]>) -> Self {
        let spatial_size = dims
            .filter(|d| d.len() >= 3)
            .map(|d| d[1])
            .filter(|&d| d > 0)
            .map(|d| d as u32)
            .unwrap_or(DEFAULT_INPUT_SIZE);
        Self { spatial_size }
    }
}

/// A callable prediction operation.
///
/// The seam between the pipeline and the model-serving backend: production
/// code uses [`OrtRuntime`], tests substitute a stub.
pub trait ModelRuntime: Send + Sync + std::fmt::Debug {
    /// The input spec declared by the model.
    fn input_spec(&self) -> ModelInputSpec;

    /// Executes the forward pass exactly once over a `[1, S, S, 3]` tensor
    /// and returns the raw output as `[1, channels]`.
    ///
    /// When the model produces several outputs, the first is taken. A 1-D
    /// output of `[channels]` is treated as a single-row batch.
    fn run(&self, input: &Tensor4D) -> Result<Tensor2D, ClassificationError>;
}

/// ONNX Runtime implementation of [`ModelRuntime`].
///
/// Built from serialized model bytes fetched over the network. The session
/// is behind a mutex because ONNX Runtime requires exclusive access to run.
#[derive(Debug)]
pub struct OrtRuntime {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_spec: ModelInputSpec,
}

impl OrtRuntime {
    /// Builds a runtime from serialized model bytes.
    ///
    /// The input and output tensor names and the declared input shape are
    /// resolved once here, so prediction never probes the session metadata.
    pub fn from_bytes(url: &str, bytes: &[u8]) -> Result<Self, ClassificationError> {
        let session = Session::builder()
            .and_then(|b| b.commit_from_memory(bytes))
            .map_err(|e| {
                ClassificationError::model_load(url, "failed to create ONNX session", e)
            })?;

        let input = session.inputs.first().ok_or_else(|| {
            ClassificationError::model_load_msg(url, "model declares no inputs")
        })?;
        let input_name = input.name.clone();
        let input_spec =
            ModelInputSpec::from_declared_shape(input.input_type.tensor_shape().map(|d| &d[..]));

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| {
                ClassificationError::model_load_msg(url, "model declares no outputs")
            })?;

        tracing::debug!(
            url,
            input = %input_name,
            output = %output_name,
            spatial_size = input_spec.spatial_size,
            "ONNX session created"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_spec,
        })
    }
}

impl ModelRuntime for OrtRuntime {
    fn input_spec(&self) -> ModelInputSpec {
        self.input_spec
    }

    fn run(&self, input: &Tensor4D) -> Result<Tensor2D, ClassificationError> {
        let input_tensor = TensorRef::from_array_view(input.view()).map_err(|e| {
            ClassificationError::inference("failed to convert input tensor", e)
        })?;
        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let mut session = self.session.lock().map_err(|_| {
            ClassificationError::inference_msg("failed to acquire session lock")
        })?;
        let outputs = session
            .run(inputs)
            .map_err(|e| ClassificationError::inference("forward pass failed", e))?;

        // The model may emit several tensors; the configured first output is
        // the distribution we care about.
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                ClassificationError::inference("failed to extract output tensor as f32", e)
            })?;

        raw_output_to_scores(shape, data)
    }
}

/// Reshapes a raw model output into `[1, channels]`.
///
/// Accepts `[1, C]` and `[C]`; anything else is an unusable shape.
pub(crate) fn raw_output_to_scores(
    shape: &[i64],
    data: &[f32],
) -> Result<Tensor2D, ClassificationError> {
    let channels = match shape {
        [1, c] if *c > 0 => *c as usize,
        [c] if *c > 0 => *c as usize,
        _ => {
            return Err(ClassificationError::inference_msg(format!(
                "unusable output shape {shape:?}, expected [1, channels] or [channels]"
            )));
        }
    };
    if data.len() != channels {
        return Err(ClassificationError::inference_msg(format!(
            "output data size mismatch: expected {channels}, got {}",
            data.len()
        )));
    }
    Ok(ndarray::ArrayView2::from_shape((1, channels), data)?.to_owned())
}

/// A loaded model together with its label metadata.
///
/// Owned by the cache; read-only after the first successful load and never
/// evicted. The runtime, input spec, and labels are resolved exactly once.
#[derive(Debug)]
pub struct LoadedModel {
    runtime: Box<dyn ModelRuntime>,
    metadata: Option<LabelMetadata>,
}

impl LoadedModel {
    /// Bundles a runtime with its (optional) label metadata.
    pub fn new(runtime: Box<dyn ModelRuntime>, metadata: Option<LabelMetadata>) -> Self {
        Self { runtime, metadata }
    }

    /// The callable prediction operation.
    pub fn runtime(&self) -> &dyn ModelRuntime {
        self.runtime.as_ref()
    }

    /// The input spec resolved at load time.
    pub fn input_spec(&self) -> ModelInputSpec {
        self.runtime.input_spec()
    }

    /// The label metadata, if it was fetched successfully.
    pub fn metadata(&self) -> Option<&LabelMetadata> {
        self.metadata.as_ref()
    }

    /// The label for an output channel.
    ///
    /// Falls back to a synthesized `"Class {index}"` when metadata is absent
    /// or does not cover the channel.
    pub fn label_for(&self, index: usize) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.labels.get(index))
            .cloned()
            .unwrap_or_else(|| format!("Class {index}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_spec_from_declared_shape() {
        let spec = ModelInputSpec::from_declared_shape(Some(&[-1, 224, 224, 3]));
        assert_eq!(spec.spatial_size, 224);

        let spec = ModelInputSpec::from_declared_shape(Some(&[1, 299, 299, 3]));
        assert_eq!(spec.spatial_size, 299);
    }

    #[test]
    fn test_input_spec_defaults_on_unusable_shape() {
        assert_eq!(
            ModelInputSpec::from_declared_shape(None).spatial_size,
            DEFAULT_INPUT_SIZE
        );
        // Dynamic spatial dimension.
        assert_eq!(
            ModelInputSpec::from_declared_shape(Some(&[-1, -1, -1, 3])).spatial_size,
            DEFAULT_INPUT_SIZE
        );
        // Too few dimensions to carry a spatial size.
        assert_eq!(
            ModelInputSpec::from_declared_shape(Some(&[1, 4])).spatial_size,
            DEFAULT_INPUT_SIZE
        );
    }

    #[test]
    fn test_raw_output_accepts_2d_and_1d() {
        let scores = raw_output_to_scores(&[1, 4], &[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(scores.shape(), &[1, 4]);

        let scores = raw_output_to_scores(&[4], &[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(scores.shape(), &[1, 4]);
    }

    #[test]
    fn test_raw_output_rejects_unusable_shape() {
        assert!(raw_output_to_scores(&[2, 4], &[0.0; 8]).is_err());
        assert!(raw_output_to_scores(&[1, 2, 2], &[0.0; 4]).is_err());
        assert!(raw_output_to_scores(&[1, 4], &[0.0; 3]).is_err());
    }

    #[test]
    fn test_metadata_parses_from_json() {
        // Mirrors the fetch path: deserialize straight from the body reader,
        // ignoring fields beyond `labels`.
        let body = br#"{ "labels": ["Serous", "Endometrioid"], "version": 3 }"#;
        let metadata: LabelMetadata = serde_json::from_reader(&body[..]).unwrap();
        assert_eq!(metadata.labels, vec!["Serous", "Endometrioid"]);

        assert!(serde_json::from_reader::<_, LabelMetadata>(&b"not json"[..]).is_err());
    }

    #[test]
    fn test_label_fallback_without_metadata() {
        #[derive(Debug)]
        struct NullRuntime;
        impl ModelRuntime for NullRuntime {
            fn input_spec(&self) -> ModelInputSpec {
                ModelInputSpec::default()
            }
            fn run(&self, _input: &Tensor4D) -> Result<Tensor2D, ClassificationError> {
                Err(ClassificationError::inference_msg("unreachable"))
            }
        }

        let model = LoadedModel::new(Box::new(NullRuntime), None);
        assert_eq!(model.label_for(2), "Class 2");

        let model = LoadedModel::new(
            Box::new(NullRuntime),
            Some(LabelMetadata {
                labels: vec!["Serous".into()],
            }),
        );
        assert_eq!(model.label_for(0), "Serous");
        assert_eq!(model.label_for(5), "Class 5");
    }
}
