//! Model file storage.
//!
//! The persisted record is a JSON object with exactly the keys `W1`, `b1`,
//! `W2`, `b2`, each a nested numeric array.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{DigitError, Result};
use crate::ml::Parameters;

/// Where parameter sets are read from and written back to.
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Read and validate a full parameter set.
    async fn load(&self) -> Result<Parameters>;

    /// Replace the stored set. Either the whole record is written or the
    /// previous one is left in place.
    async fn save(&self, params: &Parameters) -> Result<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// JSON file on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonModelFile {
    path: PathBuf,
}

impl JsonModelFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl ModelRepository for JsonModelFile {
    async fn load(&self) -> Result<Parameters> {
        debug!(path = %self.path.display(), "reading model file");

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DigitError::Config(format!(
                "cannot read model file {}: {e}",
                self.path.display()
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            DigitError::Config(format!(
                "invalid JSON in model file {}: {e}",
                self.path.display()
            ))
        })?;
        let params = Parameters::from_json_value(value)?;

        info!(
            path = %self.path.display(),
            hidden_units = params.hidden_units(),
            "model parameters loaded"
        );
        Ok(params)
    }

    async fn save(&self, params: &Parameters) -> Result<()> {
        let body = serde_json::to_vec(params)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write next to the target, then rename over it.
        let tmp = self.temp_path();
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "model file rename failed");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = body.len(), "model parameters saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
