//! ChurnForge: credit portfolio churn analysis
//!
//! This library cleans a customer transaction dataset, breaks the churn
//! rate down by age, income and credit score, trains a bagged
//! decision-tree churn classifier and writes a JSON report, a model file
//! and a chart image.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod report;
pub mod store;
pub mod viz;

#[cfg(test)]
mod test_support;

// Re-export public items for easier access
pub use analysis::{analyze_portfolio, AnalysisResult, SegmentDimension};
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{load_and_clean, CleanedDataset, CleaningOptions};
pub use error::{PortfolioError, Result};
pub use model::{build_churn_model, ForestConfig, ModelEvaluation, TrainedChurnModel};
pub use report::{assemble_report, generate_reports, run_pipeline, PortfolioReport};
pub use viz::render_segment_plots;
