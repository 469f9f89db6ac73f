//! Command-line interface definitions and argument parsing

use crate::config::{
    PipelineConfig, DEFAULT_INPUT, DEFAULT_MODEL_PATH, DEFAULT_PLOT_PATH, DEFAULT_REPORT_PATH,
};
use crate::data::CleaningOptions;
use crate::model::ForestConfig;
use clap::Parser;
use std::path::PathBuf;

/// Credit portfolio churn analysis: segmentation statistics and a churn model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the customer CSV file
    #[arg(short, long, default_value = DEFAULT_INPUT)]
    pub input: PathBuf,

    /// Output path for the trained model
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    pub model_output: PathBuf,

    /// Output path for the segment bar charts
    #[arg(long, default_value = DEFAULT_PLOT_PATH)]
    pub plot_output: PathBuf,

    /// Output path for the JSON report
    #[arg(long, default_value = DEFAULT_REPORT_PATH)]
    pub report_output: PathBuf,

    /// Seed for the train/test split and the bootstrap samples
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of trees in the ensemble
    #[arg(long, default_value = "100")]
    pub trees: usize,

    /// Share of rows held out for evaluation
    #[arg(long, default_value = "0.2")]
    pub test_size: f64,

    /// Keep the one-hot indicator columns instead of discarding them
    #[arg(long)]
    pub keep_indicators: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate the arguments and turn them into a pipeline configuration
    pub fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            anyhow::bail!("Test size must be between 0 and 1, got {}", self.test_size);
        }
        if self.trees == 0 {
            anyhow::bail!("The ensemble needs at least one tree");
        }

        Ok(PipelineConfig {
            input: self.input.clone(),
            model_path: self.model_output.clone(),
            plot_path: self.plot_output.clone(),
            report_path: self.report_output.clone(),
            cleaning: CleaningOptions {
                retain_indicators: self.keep_indicators,
            },
            forest: ForestConfig {
                n_trees: self.trees,
                test_fraction: self.test_size,
                seed: self.seed,
            },
        })
    }
}
