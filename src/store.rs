//! Artifact persistence: model and report files

use crate::error::{PortfolioError, Result};
use crate::model::TrainedChurnModel;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Create the parent directory of `path` if it does not exist yet
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| PortfolioError::persistence(path, e))
        }
        _ => Ok(()),
    }
}

/// Persist a trained model as JSON, overwriting any existing file
pub fn save_model(model: &TrainedChurnModel, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_vec(model).map_err(|e| PortfolioError::persistence(path, e))?;
    fs::write(path, json).map_err(|e| PortfolioError::persistence(path, e))?;

    tracing::info!(path = %path.display(), trees = model.n_trees(), "model saved");
    Ok(())
}

/// Read back a model written by [`save_model`]
pub fn load_model(path: &Path) -> Result<TrainedChurnModel> {
    let bytes = fs::read(path).map_err(|e| PortfolioError::load(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PortfolioError::load(path, e))
}

/// Write any serializable report as indented JSON
pub fn write_report<T: Serialize>(report: &T, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let json =
        serde_json::to_string_pretty(report).map_err(|e| PortfolioError::persistence(path, e))?;
    fs::write(path, json).map_err(|e| PortfolioError::persistence(path, e))?;

    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
