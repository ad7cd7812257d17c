//! ONNX Runtime backed inference engine.

use crate::config::RuntimeConfig;
use crate::engine::{InferenceEngine, Stage, Tensor, TensorInputs, TensorOutputs};
use crate::error::{Result, TtsError};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One ONNX Runtime session per model stage.
pub struct OnnxEngine {
    sessions: HashMap<Stage, Session>,
}

impl OnnxEngine {
    /// Load the four stage models from `runtime.onnx_dir`.
    pub fn load(runtime: &RuntimeConfig) -> Result<Self> {
        if runtime.use_gpu {
            return Err(TtsError::invalid_input("GPU mode is not supported"));
        }

        let mut sessions = HashMap::new();
        for stage in Stage::ALL {
            let path = runtime.model_path(stage.model_file());
            info!("Loading {} from {:?}", stage, path);
            sessions.insert(stage, load_session(stage, &path)?);
        }
        Ok(Self { sessions })
    }
}

fn load_session(stage: Stage, path: &Path) -> Result<Session> {
    if !path.exists() {
        return Err(TtsError::load(format!("{stage} model not found at {path:?}")));
    }

    let builder = Session::builder()
        .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
        .map_err(|e| TtsError::load(format!("failed to create {stage} session: {e}")))?;
    let session = builder
        .commit_from_file(path)
        .map_err(|e| TtsError::load(format!("{stage} model {path:?}: {e}")))?;

    let output = stage.output_name();
    if !session.outputs().iter().any(|o| o.name() == output) {
        return Err(TtsError::load(format!(
            "{stage} model {path:?} has no `{output}` output"
        )));
    }
    Ok(session)
}

fn to_value(stage: Stage, name: &str, tensor: Tensor) -> Result<Value> {
    let value = match tensor {
        Tensor::Float(array) => Value::from_array(array).map(Into::into),
        Tensor::Int(array) => Value::from_array(array).map(Into::into),
    };
    value.map_err(|e| TtsError::engine(format!("{stage}: failed to convert `{name}`: {e}")))
}

impl InferenceEngine for OnnxEngine {
    fn run(&mut self, stage: Stage, inputs: TensorInputs) -> Result<TensorOutputs> {
        let session = self
            .sessions
            .get_mut(&stage)
            .ok_or_else(|| TtsError::engine(format!("{stage} session is not loaded")))?;

        let ort_inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = inputs
            .into_iter()
            .map(|(name, tensor)| Ok((Cow::Borrowed(name), to_value(stage, name, tensor)?.into())))
            .collect::<Result<_>>()?;

        let outputs = session
            .run(SessionInputs::from(ort_inputs))
            .map_err(|e| TtsError::engine(format!("{stage} inference failed: {e}")))?;

        let name = stage.output_name();
        let array = outputs[name]
            .try_extract_array::<f32>()
            .map_err(|e| TtsError::engine(format!("{stage}: failed to extract `{name}`: {e}")))?
            .to_owned();

        let mut result = TensorOutputs::new();
        result.insert(name.to_string(), Tensor::Float(array));
        Ok(result)
    }
}
