use crate::config::{AppConfig, GbdtParams};
use crate::features::{self, FeatureSet};
use crate::gbdt::GbdtModel;
use crate::trainer::{self, build_dataset, Target};
use crate::{report, series};
use anyhow::Result;
use log::info;
use serde_json::json;

/// Holdout test: train on the configured earlier years only, score the
/// held-out season blind, then sanity-check the in-progress season against
/// the same model.
pub fn run(config: &AppConfig, params: GbdtParams) -> Result<()> {
    let mut merged = series::read_artifact(&series::artifact_path(config))?;
    features::engineer(&mut merged, config.trend_base_year);

    let holdout = trainer::holdout_validation(&merged, config, params)?;
    info!(
        "Holdout {:?} -> {}: MAE {:.1}, R2 {:.3}, MAPE {:.1}%, season total {:+.1}%",
        holdout.train_years,
        holdout.test_year,
        holdout.metrics.mae,
        holdout.metrics.r2,
        holdout.metrics.mape,
        holdout.season_error_pct
    );
    for week in &holdout.weekly {
        info!(
            "  week {:>2}: actual {:>5.0} predicted {:>5.0} ({:+.1}%)",
            week.week_num, week.actual_total, week.predicted_total, week.error_pct
        );
    }

    // Refit the holdout model for the partial-season check. The fit is
    // deterministic, so this reproduces the model scored above.
    let train_days: Vec<_> = merged
        .iter()
        .filter(|day| config.holdout_train_years.contains(&day.year))
        .cloned()
        .collect();
    let train = build_dataset(&train_days, FeatureSet::Baseline, Target::TotalLeads)?;
    let model = GbdtModel::fit(&train.rows, &train.targets, &train.feature_set.names(), params)?;

    let partial = trainer::partial_season_check(&model, &merged, config)?;
    match &partial {
        Some(check) => info!(
            "{} so far: {} days, actual {:.0} vs predicted {:.0} ({:+.1}%), daily MAE {:.1}",
            check.year,
            check.days,
            check.total_actual,
            check.total_predicted,
            check.error_pct,
            check.daily_mae
        ),
        None => info!(
            "No usable {} rows yet; skipping the early-season check",
            config.partial_year
        ),
    }

    report::write_json(
        config,
        "validation_results.json",
        &json!({
            "holdoutTest": holdout,
            "partialSeasonCheck": partial,
        }),
    )?;
    Ok(())
}
