//! Pipeline configuration

use crate::data::CleaningOptions;
use crate::model::ForestConfig;
use std::path::PathBuf;

pub const DEFAULT_INPUT: &str = "datasets/customer_churn_dataset.csv";
pub const DEFAULT_MODEL_PATH: &str = "models/churn_model.json";
pub const DEFAULT_PLOT_PATH: &str = "reports/analysis_plots.png";
pub const DEFAULT_REPORT_PATH: &str = "reports/portfolio_analysis.json";

/// Everything one pipeline run needs, passed explicitly to each stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Customer CSV to analyze
    pub input: PathBuf,
    /// Where the trained model is persisted
    pub model_path: PathBuf,
    /// Where the segment bar charts are rendered
    pub plot_path: PathBuf,
    /// Where the merged JSON report is written
    pub report_path: PathBuf,
    pub cleaning: CleaningOptions,
    pub forest: ForestConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            plot_path: PathBuf::from(DEFAULT_PLOT_PATH),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            cleaning: CleaningOptions::default(),
            forest: ForestConfig::default(),
        }
    }
}
