// Shared ONNX Runtime session builder with execution provider selection
//
// Used by the text region detector and both halves of the recognizer.

use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "openvino")]
use ort::execution_providers::OpenVINOExecutionProvider;

#[cfg(all(target_os = "windows", feature = "directml"))]
use ort::execution_providers::DirectMLExecutionProvider;

#[cfg(all(target_os = "macos", feature = "coreml"))]
use ort::execution_providers::CoreMLExecutionProvider;

use crate::core::config::ModelConfig;
use crate::core::errors::{OcrError, OcrResult};

/// Load a model from disk, returning the device label and the session.
///
/// A missing file is reported as `ModelNotFound` before any runtime work.
pub fn build_session(model_path: &Path, config: &ModelConfig) -> OcrResult<(String, Session)> {
    if !model_path.exists() {
        return Err(OcrError::ModelNotFound(model_path.display().to_string()));
    }

    info!("Loading ONNX model: {}", model_path.display());

    if let Some(ref backend) = config.inference_backend {
        if backend != "AUTO" {
            return forced_backend(backend, model_path, config.intra_threads);
        }
    }

    #[cfg(feature = "tensorrt")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([TensorRTExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using TensorRT acceleration");
            return Ok(("TensorRT".to_string(), session));
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([CUDAExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using CUDA acceleration");
            return Ok(("CUDA".to_string(), session));
        }
    }

    #[cfg(all(target_os = "macos", feature = "coreml"))]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([CoreMLExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using CoreML acceleration");
            return Ok(("CoreML".to_string(), session));
        }
    }

    #[cfg(all(target_os = "windows", feature = "directml"))]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([DirectMLExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using DirectML acceleration");
            return Ok(("DirectML".to_string(), session));
        }
    }

    #[cfg(feature = "openvino")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| {
                b.with_execution_providers([OpenVINOExecutionProvider::default()
                    .with_device_type("CPU")
                    .build()])
            })
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
        {
            info!("✓ Using OpenVINO acceleration");
            return Ok(("OpenVINO-CPU".to_string(), session));
        }
    }

    cpu_session(model_path, config.intra_threads).map(|s| ("CPU".to_string(), s))
}

fn cpu_session(model_path: &Path, intra_threads: usize) -> OcrResult<Session> {
    debug!("CPU session with {} intra-op threads", intra_threads);
    let session = Session::builder()?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?
        .commit_from_file(model_path)?;
    Ok(session)
}

fn forced_backend(backend: &str, model_path: &Path, intra_threads: usize) -> OcrResult<(String, Session)> {
    info!("INFERENCE_BACKEND={}, forcing specific backend", backend);
    match backend {
        "CPU" => cpu_session(model_path, intra_threads).map(|s| ("CPU (forced)".to_string(), s)),

        #[cfg(feature = "cuda")]
        "CUDA" => {
            let session = Session::builder()?
                .with_execution_providers([CUDAExecutionProvider::default().build()])?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path)?;
            Ok(("CUDA (forced)".to_string(), session))
        }

        #[cfg(feature = "tensorrt")]
        "TENSORRT" => {
            let session = Session::builder()?
                .with_execution_providers([TensorRTExecutionProvider::default().build()])?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_file(model_path)?;
            Ok(("TensorRT (forced)".to_string(), session))
        }

        other => {
            warn!(
                "Inference backend '{}' is not compiled in, using CPU. Valid without extra features: CPU, AUTO",
                other
            );
            cpu_session(model_path, intra_threads).map(|s| ("CPU".to_string(), s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_model_is_reported_before_loading() {
        let config = crate::core::config::Config::default().models;
        let path = PathBuf::from("/nonexistent/comic-text-detector.onnx");
        match build_session(&path, &config) {
            Err(OcrError::ModelNotFound(asset)) => assert!(asset.contains("comic-text-detector")),
            other => panic!("expected ModelNotFound, got {:?}", other.map(|(d, _)| d)),
        }
    }
}
