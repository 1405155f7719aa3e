//! PersonaForge: customer persona segmentation from transaction history
//!
//! This is the main entrypoint that orchestrates data loading, feature
//! extraction, segmentation, reporting, and prediction.

use anyhow::{Context, Result};
use clap::Parser;
use personaforge::{
    load_transactions, report, Args, FeatureExtractor, SegmentationModel, Segmenter,
};
use std::time::Instant;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = args.pipeline_config().context("invalid pipeline configuration")?;

    if let Some(customer_id) = &args.predict {
        run_prediction_mode(&args, &config, customer_id)
    } else {
        run_full_pipeline(&args, config)
    }
}

/// Score one customer against a saved model
fn run_prediction_mode(
    args: &Args,
    config: &personaforge::PipelineConfig,
    customer_id: &str,
) -> Result<()> {
    let model_path = args
        .model
        .as_ref()
        .context("--predict requires --model")?;
    let model = SegmentationModel::load(model_path)?;

    let rows = load_transactions(&args.input)?;
    let extractor = FeatureExtractor::from_config(config);
    let transactions: Vec<_> = extractor
        .validate(&rows)?
        .into_iter()
        .filter(|tx| tx.customer_id == customer_id)
        .collect();
    if transactions.is_empty() {
        anyhow::bail!("customer '{}' has no transactions in {}", customer_id, args.input.display());
    }

    let vector = extractor.extract(customer_id, &transactions)?;
    let assignment = model.score(&vector)?;

    println!("{}", serde_json::to_string_pretty(&assignment)?);
    Ok(())
}

/// Run full segmentation pipeline
fn run_full_pipeline(args: &Args, config: personaforge::PipelineConfig) -> Result<()> {
    let start_time = Instant::now();

    let rows = load_transactions(&args.input)?;
    log::info!("Loaded {} transaction rows", rows.len());

    let vectors = FeatureExtractor::from_config(&config).extract_raw(&rows)?;

    let segmenter = Segmenter::new(config)?;
    let segmentation = segmenter.segment(&vectors)?;

    report::print_summary(&segmentation);

    if let Some(output) = &args.output {
        let body = serde_json::json!({
            "assignments": segmentation.assignments,
            "centroids": segmentation.centroids,
        });
        std::fs::write(output, serde_json::to_string_pretty(&body)?)
            .with_context(|| format!("writing {}", output.display()))?;
        log::info!("Assignments saved to {}", output.display());
    }

    if let Some(model_out) = &args.model_out {
        segmentation.model.save(model_out)?;
    }

    log::info!("Pipeline complete in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
