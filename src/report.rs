//! Report assembly and the end-to-end pipeline

use crate::analysis::{analyze_portfolio, AnalysisResult};
use crate::config::PipelineConfig;
use crate::data::{load_and_clean, CleanedDataset, CleaningSummary};
use crate::error::Result;
use crate::model::{build_churn_model, ModelEvaluation};
use crate::store::{save_model, write_report};
use crate::viz::render_segment_plots;
use serde::Serialize;

/// Analysis and model results merged into one mapping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    #[serde(flatten)]
    pub evaluation: ModelEvaluation,
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub cleaning: CleaningSummary,
    pub report: PortfolioReport,
}

/// Merge the two results. No computation happens here.
pub fn assemble_report(analysis: AnalysisResult, evaluation: ModelEvaluation) -> PortfolioReport {
    PortfolioReport {
        analysis,
        evaluation,
    }
}

/// Segment and train over the same dataset, persist the model, render
/// the plots and return the merged report
pub fn generate_reports(dataset: &CleanedDataset, config: &PipelineConfig) -> Result<PortfolioReport> {
    let analysis = analyze_portfolio(dataset)?;
    let (model, evaluation) = build_churn_model(dataset, &config.forest)?;

    save_model(&model, &config.model_path)?;
    render_segment_plots(&analysis.segmented_analysis, &config.plot_path)?;

    Ok(assemble_report(analysis, evaluation))
}

/// Load, clean, analyze, train and write all three artifacts.
///
/// Artifacts are written in order (model, plot, report); a failure
/// midway leaves only the ones written before it.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineRun> {
    let (dataset, cleaning) = load_and_clean(&config.input, &config.cleaning)?;
    let report = generate_reports(&dataset, config)?;
    write_report(&report, &config.report_path)?;

    Ok(PipelineRun { cleaning, report })
}
