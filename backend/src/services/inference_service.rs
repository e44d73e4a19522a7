//! Bridge to the external prediction process.
//!
//! The model runs as a separate program that receives an image path and a
//! `top-k` count and prints a JSON document with the ranked predictions on
//! stdout. Uploaded bytes are handed over through a temporary file that is
//! removed when the prediction finishes, whatever the outcome.

use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::InferenceConfig;
use crate::errors::{InferenceError, ServiceError, ServiceResult};

const DEFAULT_SUFFIX: &str = ".jpg";

/// Runs the model on an image stored at `image_path`.
#[async_trait]
pub trait InferenceRunner: Send + Sync {
    async fn run_inference(
        &self,
        image_path: &Path,
        top_k: u32,
    ) -> Result<Value, InferenceError>;
}

/// Spawns `<python> -m <module> --image <path> --top-k <k>`.
pub struct PythonInferenceRunner {
    python_command: String,
    module: String,
    project_root: PathBuf,
    timeout: Duration,
}

impl PythonInferenceRunner {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            python_command: config.python_command.clone(),
            module: config.module.clone(),
            project_root: config.project_root.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl InferenceRunner for PythonInferenceRunner {
    async fn run_inference(
        &self,
        image_path: &Path,
        top_k: u32,
    ) -> Result<Value, InferenceError> {
        let mut command = Command::new(&self.python_command);
        command
            .arg("-m")
            .arg(&self.module)
            .arg("--image")
            .arg(image_path)
            .arg("--top-k")
            .arg(top_k.to_string())
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(image = %image_path.display(), top_k, "Spawning inference process");

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| InferenceError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(InferenceError::NonZeroExit {
                code: output.status.code(),
                output: combined.trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Runs a prediction for uploaded image bytes.
///
/// The bytes are written to a temporary file carrying the upload's
/// extension; the file is deleted on drop, including on error and timeout.
pub async fn predict_image(
    runner: &dyn InferenceRunner,
    bytes: Vec<u8>,
    file_name: Option<&str>,
    top_k: u32,
) -> ServiceResult<Value> {
    let suffix = resolve_suffix(file_name);
    let temp_image = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("rice-upload-")
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(|e| ServiceError::internal_error(format!("Upload staging task failed: {}", e)))?
    .map_err(InferenceError::from)?;

    let result = runner.run_inference(temp_image.path(), top_k).await?;
    info!("Inference completed");
    Ok(result)
}

/// Keeps the upload's extension so the model can sniff the format.
fn resolve_suffix(file_name: Option<&str>) -> String {
    match file_name.and_then(|name| name.rfind('.').map(|idx| &name[idx..])) {
        Some(ext) if ext.len() > 1 && !ext.contains(['/', '\\']) => ext.to_string(),
        _ => DEFAULT_SUFFIX.to_string(),
    }
}
