use crate::config::{AppConfig, GbdtParams};
use crate::features::{self, FeatureSet};
use crate::trainer::{build_dataset, train_and_evaluate, Target};
use crate::{report, series};
use anyhow::Result;
use log::info;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HyperparametersSummary {
    n_trees: usize,
    max_depth: usize,
    learning_rate: f64,
    subsample: f64,
    min_samples_leaf: usize,
    seed: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetSummary {
    target: String,
    rows: usize,
    cross_val_mae: f64,
    cross_val_mae_std: f64,
    in_sample: crate::metrics::RegressionMetrics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainingSummary {
    hyperparameters: HyperparametersSummary,
    feature_count: usize,
    start_date: Option<String>,
    end_date: Option<String>,
    targets: Vec<TargetSummary>,
}

/// Trains the total-leads and organic-leads models from the merged artifact
/// and writes the training summary plus importance tables.
pub fn run(config: &AppConfig, params: GbdtParams) -> Result<()> {
    let merged = series::read_artifact(&series::artifact_path(config))?;
    let mut full_years = series::filter_years(&merged, &config.full_years);
    features::engineer(&mut full_years, config.trend_base_year);

    let total_dataset = build_dataset(&full_years, FeatureSet::Baseline, Target::TotalLeads)?;
    let organic_dataset = build_dataset(&full_years, FeatureSet::Baseline, Target::OrganicLeads)?;
    info!(
        "Training on {} rows, {} features",
        total_dataset.rows.len(),
        FeatureSet::Baseline.len()
    );

    let (total, organic) = rayon::join(
        || train_and_evaluate(&total_dataset, params),
        || train_and_evaluate(&organic_dataset, params),
    );
    let total = total?;
    let organic = organic?;

    report::write_csv(config, "feature_importance.csv", &report::importance_rows(&total.model))?;
    report::write_csv(
        config,
        "organic_feature_importance.csv",
        &report::importance_rows(&organic.model),
    )?;

    let summary = TrainingSummary {
        hyperparameters: HyperparametersSummary {
            n_trees: params.n_trees,
            max_depth: params.max_depth,
            learning_rate: params.learning_rate,
            subsample: params.subsample,
            min_samples_leaf: params.min_samples_leaf,
            seed: params.seed,
        },
        feature_count: FeatureSet::Baseline.len(),
        start_date: total_dataset.dates.first().map(|d| d.to_string()),
        end_date: total_dataset.dates.last().map(|d| d.to_string()),
        targets: vec![
            TargetSummary {
                target: Target::TotalLeads.label().to_string(),
                rows: total_dataset.rows.len(),
                cross_val_mae: total.cv.mean_mae,
                cross_val_mae_std: total.cv.std_mae,
                in_sample: total.in_sample,
            },
            TargetSummary {
                target: Target::OrganicLeads.label().to_string(),
                rows: organic_dataset.rows.len(),
                cross_val_mae: organic.cv.mean_mae,
                cross_val_mae_std: organic.cv.std_mae,
                in_sample: organic.in_sample,
            },
        ],
    };
    report::write_json(config, "training_summary.json", &summary)?;
    Ok(())
}
