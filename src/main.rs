//! ChurnForge: credit portfolio churn analysis CLI
//!
//! This is the main entrypoint that wires logging, argument parsing and the
//! analysis pipeline, then prints a short summary of the run.

use anyhow::{Context, Result};
use churnforge::report::PipelineRun;
use churnforge::{run_pipeline, Args, PipelineConfig};
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Number of features listed in the summary
const TOP_FEATURES: usize = 5;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.to_config()?;
    tracing::debug!(?config, "configuration resolved");

    println!("=== Portfolio Churn Analysis ===\n");
    let start_time = Instant::now();
    let run = run_pipeline(&config)
        .with_context(|| format!("pipeline failed for {}", config.input.display()))?;
    let total_time = start_time.elapsed();

    print_summary(&run, &config);

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());
    println!("Model saved to: {}", config.model_path.display());
    println!("Plots saved to: {}", config.plot_path.display());
    println!("Report saved to: {}", config.report_path.display());

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "churnforge=debug"
    } else {
        "churnforge=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_summary(run: &PipelineRun, config: &PipelineConfig) {
    let summary = &run.report.analysis.summary;
    let evaluation = &run.report.evaluation;

    println!("✓ Data cleaned: {} customers", run.cleaning.rows);
    if !run.cleaning.discarded_indicators.is_empty() {
        println!(
            "  {} indicator columns discarded (use --keep-indicators to retain them)",
            run.cleaning.discarded_indicators.len()
        );
    }

    println!("\n=== Portfolio Statistics ===");
    println!("Churn rate: {:.1}%", summary.churn_rate * 100.0);
    println!("Average credit score: {:.1}", summary.avg_credit_score);
    println!("Average loan amount: {:.2}", summary.avg_loan_amount);
    println!("Default rate: {:.1}%", summary.default_rate * 100.0);

    println!("\n=== Churn Model ({} trees) ===", config.forest.n_trees);
    println!("Accuracy: {:.3}", evaluation.model_performance.accuracy);
    println!("Weighted F1: {:.3}", evaluation.model_performance.weighted_avg.f1_score);

    let mut ranked: Vec<&(String, f64)> = evaluation.feature_importance.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("Top features:");
    for (name, score) in ranked.into_iter().take(TOP_FEATURES) {
        println!("  {name}: {score:.3}");
    }
}
