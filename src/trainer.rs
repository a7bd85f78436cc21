use crate::classify::classify_quality;
use crate::config::{AppConfig, GbdtParams};
use crate::features::{feature_vector, FeatureSet, MOMENTUM_FEATURES};
use crate::gbdt::GbdtModel;
use crate::metrics::{
    self, mean_absolute_error, population_std_dev, regression_metrics, RegressionMetrics,
};
use crate::models::{MergedDay, WeatherQuality};
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::info;
use serde::Serialize;

pub const WALK_FORWARD_SPLITS: usize = 5;

pub const DOW_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Which lead count a model predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    TotalLeads,
    OrganicLeads,
}

impl Target {
    pub fn label(&self) -> &'static str {
        match self {
            Target::TotalLeads => "total_leads",
            Target::OrganicLeads => "organic_leads",
        }
    }

    pub fn value(&self, day: &MergedDay) -> f64 {
        match self {
            Target::TotalLeads => day.total_leads as f64,
            Target::OrganicLeads => day.organic_leads as f64,
        }
    }
}

/// Model-ready rows in strict date order.
pub struct Dataset {
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub dates: Vec<NaiveDate>,
    pub feature_set: FeatureSet,
}

/// Extracts model rows from an engineered series. Days missing the core
/// weather observations are excluded; days missing an enrichment stage are a
/// contract violation and fail the build.
pub fn build_dataset(days: &[MergedDay], set: FeatureSet, target: Target) -> Result<Dataset> {
    let mut usable: Vec<&MergedDay> = days.iter().filter(|day| day.has_core_weather()).collect();
    usable.sort_by_key(|day| day.date);

    let mut rows = Vec::with_capacity(usable.len());
    let mut targets = Vec::with_capacity(usable.len());
    let mut dates = Vec::with_capacity(usable.len());
    for day in usable {
        rows.push(feature_vector(day, set)?);
        targets.push(target.value(day));
        dates.push(day.date);
    }
    if rows.is_empty() {
        return Err(anyhow!(
            "no rows with weather observations to train {} on",
            target.label()
        ));
    }
    Ok(Dataset {
        rows,
        targets,
        dates,
        feature_set: set,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidation {
    pub fold_maes: Vec<f64>,
    pub mean_mae: f64,
    pub std_mae: f64,
}

/// Chronological k-fold: each fold trains on a contiguous prefix and scores
/// the block immediately after it. Later folds reuse earlier test blocks as
/// training data; no fold ever sees the future.
pub fn walk_forward_cv(
    dataset: &Dataset,
    params: GbdtParams,
    n_splits: usize,
) -> Result<CrossValidation> {
    let n = dataset.rows.len();
    let test_size = n / (n_splits + 1);
    if test_size == 0 {
        return Err(anyhow!(
            "{} rows are too few for {}-fold walk-forward validation",
            n,
            n_splits
        ));
    }

    let mut fold_maes = Vec::with_capacity(n_splits);
    for fold in 0..n_splits {
        let test_start = n - (n_splits - fold) * test_size;
        let test_end = test_start + test_size;
        debug_assert!(dataset.dates[..test_start]
            .iter()
            .all(|d| *d < dataset.dates[test_start]));

        let model = GbdtModel::fit(
            &dataset.rows[..test_start],
            &dataset.targets[..test_start],
            &dataset.feature_set.names(),
            params,
        )?;
        let predicted = model.predict_many(&dataset.rows[test_start..test_end])?;
        fold_maes.push(mean_absolute_error(
            &dataset.targets[test_start..test_end],
            &predicted,
        ));
    }

    let mean_mae = metrics::mean(&fold_maes);
    let std_mae = population_std_dev(&fold_maes);
    Ok(CrossValidation {
        fold_maes,
        mean_mae,
        std_mae,
    })
}

pub struct TrainedOutcome {
    pub model: GbdtModel,
    pub cv: CrossValidation,
    pub in_sample: RegressionMetrics,
}

/// Walk-forward CV for the honest error estimate, then a refit on all rows
/// for downstream prediction.
pub fn train_and_evaluate(dataset: &Dataset, params: GbdtParams) -> Result<TrainedOutcome> {
    let cv = walk_forward_cv(dataset, params, WALK_FORWARD_SPLITS)?;
    let model = GbdtModel::fit(
        &dataset.rows,
        &dataset.targets,
        &dataset.feature_set.names(),
        params,
    )?;
    let predicted = model.predict_many(&dataset.rows)?;
    let in_sample = regression_metrics(&dataset.targets, &predicted);

    info!(
        "{} features: cross-val MAE {:.2} (+/- {:.2}), in-sample MAE {:.2}, R2 {:.3}, MAPE {:.1}%",
        dataset.feature_set.label(),
        cv.mean_mae,
        cv.std_mae,
        in_sample.mae,
        in_sample.r2,
        in_sample.mape
    );

    Ok(TrainedOutcome {
        model,
        cv,
        in_sample,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAccuracy {
    pub week_num: u32,
    pub actual_total: f64,
    pub predicted_total: f64,
    pub error_pct: f64,
    pub daily_mae: f64,
    pub days: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAccuracy {
    pub label: String,
    pub avg_actual: f64,
    pub avg_predicted: f64,
    pub error_pct: f64,
    pub mae: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldoutReport {
    pub train_years: Vec<i32>,
    pub test_year: i32,
    pub train_days: usize,
    pub test_days: usize,
    pub metrics: RegressionMetrics,
    pub total_actual: f64,
    pub total_predicted: f64,
    pub season_error_pct: f64,
    pub weekly: Vec<WeeklyAccuracy>,
    pub by_dow: Vec<BucketAccuracy>,
    pub by_quality: Vec<BucketAccuracy>,
}

fn bucket_accuracy(label: &str, pairs: &[(f64, f64)]) -> BucketAccuracy {
    let actual: Vec<f64> = pairs.iter().map(|(a, _)| *a).collect();
    let predicted: Vec<f64> = pairs.iter().map(|(_, p)| *p).collect();
    let avg_actual = metrics::mean(&actual);
    let avg_predicted = metrics::mean(&predicted);
    BucketAccuracy {
        label: label.to_string(),
        avg_actual,
        avg_predicted,
        error_pct: if avg_actual > 0.0 {
            (avg_predicted / avg_actual - 1.0) * 100.0
        } else {
            0.0
        },
        mae: mean_absolute_error(&actual, &predicted),
        count: pairs.len(),
    }
}

/// Trains on the configured earlier years only and scores the held-out year
/// blind. The partial in-progress season is excluded from both sides; feature
/// enrichment is per-year, so no test statistic leaks into training.
pub fn holdout_validation(
    days: &[MergedDay],
    config: &AppConfig,
    params: GbdtParams,
) -> Result<HoldoutReport> {
    let train_days: Vec<MergedDay> = days
        .iter()
        .filter(|day| config.holdout_train_years.contains(&day.year))
        .cloned()
        .collect();
    let test_days: Vec<MergedDay> = days
        .iter()
        .filter(|day| day.year == config.holdout_test_year)
        .cloned()
        .collect();
    if test_days.is_empty() {
        return Err(anyhow!(
            "no rows found for holdout test year {}",
            config.holdout_test_year
        ));
    }

    let train = build_dataset(&train_days, FeatureSet::Baseline, Target::TotalLeads)?;
    let test = build_dataset(&test_days, FeatureSet::Baseline, Target::TotalLeads)?;
    info!(
        "Holdout split: {} train days ({:?}), {} test days ({})",
        train.rows.len(),
        config.holdout_train_years,
        test.rows.len(),
        config.holdout_test_year
    );

    let model = GbdtModel::fit(&train.rows, &train.targets, &train.feature_set.names(), params)?;
    let predicted = model.predict_many(&test.rows)?;
    let holdout_metrics = regression_metrics(&test.targets, &predicted);

    let total_actual: f64 = test.targets.iter().sum();
    let total_predicted: f64 = predicted.iter().sum();
    let season_error_pct = if total_actual > 0.0 {
        (total_predicted / total_actual - 1.0) * 100.0
    } else {
        0.0
    };

    // The test dataset is date-ordered and filtered exactly like `predicted`,
    // so rows can be re-joined to their days by date.
    let scored: Vec<(&MergedDay, f64, f64)> = test
        .dates
        .iter()
        .zip(test.targets.iter())
        .zip(predicted.iter())
        .map(|((date, actual), pred)| {
            let day = test_days
                .iter()
                .find(|day| day.date == *date)
                .expect("scored date came from test_days");
            (day, *actual, *pred)
        })
        .collect();

    let mut weekly = Vec::new();
    let mut week_nums: Vec<u32> = scored.iter().map(|(day, _, _)| day.week_num).collect();
    week_nums.sort_unstable();
    week_nums.dedup();
    for week in week_nums {
        let rows: Vec<&(&MergedDay, f64, f64)> = scored
            .iter()
            .filter(|(day, _, _)| day.week_num == week)
            .collect();
        let actual_total: f64 = rows.iter().map(|(_, a, _)| a).sum();
        let predicted_total: f64 = rows.iter().map(|(_, _, p)| p).sum();
        let abs_errors: Vec<f64> = rows.iter().map(|(_, a, p)| (a - p).abs()).collect();
        weekly.push(WeeklyAccuracy {
            week_num: week,
            actual_total,
            predicted_total,
            error_pct: if actual_total > 0.0 {
                (predicted_total / actual_total - 1.0) * 100.0
            } else {
                0.0
            },
            daily_mae: metrics::mean(&abs_errors),
            days: rows.len(),
        });
    }

    let mut by_dow = Vec::new();
    for (dow, name) in DOW_NAMES.iter().enumerate() {
        let pairs: Vec<(f64, f64)> = scored
            .iter()
            .filter(|(day, _, _)| day.dow == dow as u32)
            .map(|(_, a, p)| (*a, *p))
            .collect();
        if pairs.is_empty() {
            continue;
        }
        by_dow.push(bucket_accuracy(name, &pairs));
    }

    let mut by_quality = Vec::new();
    for quality in WeatherQuality::all() {
        let pairs: Vec<(f64, f64)> = scored
            .iter()
            .filter(|(day, _, _)| classify_quality(day) == quality)
            .map(|(_, a, p)| (*a, *p))
            .collect();
        if pairs.len() < config.min_bucket_samples {
            continue;
        }
        by_quality.push(bucket_accuracy(quality.as_str(), &pairs));
    }

    Ok(HoldoutReport {
        train_years: config.holdout_train_years.clone(),
        test_year: config.holdout_test_year,
        train_days: train.rows.len(),
        test_days: test.rows.len(),
        metrics: holdout_metrics,
        total_actual,
        total_predicted,
        season_error_pct,
        weekly,
        by_dow,
        by_quality,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSeasonDay {
    pub date: NaiveDate,
    pub dow_name: String,
    pub actual: f64,
    pub predicted: f64,
    pub temp_max: Option<f64>,
    pub sunshine_hrs: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSeasonCheck {
    pub year: i32,
    pub days: usize,
    pub total_actual: f64,
    pub total_predicted: f64,
    pub error_pct: f64,
    pub daily_mae: f64,
    pub daily: Vec<PartialSeasonDay>,
}

/// Scores the in-progress season against the holdout model as an
/// out-of-sample sanity check. Returns None when that season has no usable
/// rows yet.
pub fn partial_season_check(
    model: &GbdtModel,
    days: &[MergedDay],
    config: &AppConfig,
) -> Result<Option<PartialSeasonCheck>> {
    let season: Vec<MergedDay> = days
        .iter()
        .filter(|day| day.year == config.partial_year)
        .cloned()
        .collect();
    if season.iter().filter(|day| day.has_core_weather()).count() == 0 {
        return Ok(None);
    }

    let dataset = build_dataset(&season, FeatureSet::Baseline, Target::TotalLeads)?;
    let predicted = model.predict_many(&dataset.rows)?;

    let mut daily = Vec::with_capacity(dataset.dates.len());
    for ((date, actual), pred) in dataset
        .dates
        .iter()
        .zip(dataset.targets.iter())
        .zip(predicted.iter())
    {
        let day = season
            .iter()
            .find(|day| day.date == *date)
            .expect("scored date came from the partial season");
        daily.push(PartialSeasonDay {
            date: *date,
            dow_name: DOW_NAMES[day.dow as usize].to_string(),
            actual: *actual,
            predicted: *pred,
            temp_max: day.temp_max,
            sunshine_hrs: day.sunshine_hrs,
        });
    }

    let total_actual: f64 = dataset.targets.iter().sum();
    let total_predicted: f64 = predicted.iter().sum();
    Ok(Some(PartialSeasonCheck {
        year: config.partial_year,
        days: dataset.dates.len(),
        total_actual,
        total_predicted,
        error_pct: if total_actual > 0.0 {
            (total_predicted / total_actual - 1.0) * 100.0
        } else {
            0.0
        },
        daily_mae: mean_absolute_error(&dataset.targets, &predicted),
        daily,
    }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelComparison {
    pub baseline_cv_mae: f64,
    pub momentum_cv_mae: f64,
    pub baseline_r2: f64,
    pub momentum_r2: f64,
    /// Share of total importance carried by the momentum-only features.
    pub momentum_importance_pct: f64,
}

/// Fits the baseline and momentum-enhanced models on the same rows and
/// targets and compares them. The two fits are independent, so they run in
/// parallel.
pub fn compare_feature_sets(days: &[MergedDay], params: GbdtParams) -> Result<ModelComparison> {
    let baseline_dataset = build_dataset(days, FeatureSet::Baseline, Target::TotalLeads)?;
    let momentum_dataset = build_dataset(days, FeatureSet::Momentum, Target::TotalLeads)?;

    let (baseline, momentum) = rayon::join(
        || train_and_evaluate(&baseline_dataset, params),
        || train_and_evaluate(&momentum_dataset, params),
    );
    let baseline = baseline?;
    let momentum = momentum?;

    let momentum_importance: f64 = momentum
        .model
        .feature_importance()
        .iter()
        .filter(|(name, _)| MOMENTUM_FEATURES.contains(&name.as_str()))
        .map(|(_, share)| share)
        .sum();

    Ok(ModelComparison {
        baseline_cv_mae: baseline.cv.mean_mae,
        momentum_cv_mae: momentum.cv.mean_mae,
        baseline_r2: baseline.in_sample.r2,
        momentum_r2: momentum.in_sample.r2,
        momentum_importance_pct: momentum_importance * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use crate::models::{DailyRecord, WeatherRecord};
    use chrono::Days;

    fn synthetic_days(year: i32, count: usize) -> Vec<MergedDay> {
        (0..count)
            .map(|offset| {
                let date =
                    NaiveDate::from_ymd_opt(year, 2, 15).unwrap() + Days::new(offset as u64);
                let leads = 20 + (offset % 7) as u32 * 3;
                let daily = DailyRecord::new(date, (2, 15), leads, 4, leads - 4);
                let weather = WeatherRecord {
                    date,
                    temp_max: Some(45.0 + (offset % 20) as f64),
                    temp_mean: Some(40.0 + (offset % 20) as f64),
                    sunshine_hrs: Some((offset % 11) as f64),
                    precip_in: Some(if offset % 5 == 0 { 0.3 } else { 0.0 }),
                    ..WeatherRecord::default()
                };
                MergedDay::from_parts(&daily, Some(&weather))
            })
            .collect()
    }

    fn engineered(year: i32, count: usize) -> Vec<MergedDay> {
        let mut days = synthetic_days(year, count);
        features::engineer(&mut days, 2021);
        days
    }

    #[test]
    fn dataset_excludes_days_without_core_weather() {
        let mut days = engineered(2023, 10);
        days[3].temp_max = None;
        let dataset = build_dataset(&days, FeatureSet::Baseline, Target::TotalLeads).unwrap();
        assert_eq!(dataset.rows.len(), 9);
    }

    #[test]
    fn every_fold_tests_strictly_after_its_training_block() {
        let days = engineered(2023, 60);
        let dataset = build_dataset(&days, FeatureSet::Baseline, Target::TotalLeads).unwrap();
        let n = dataset.rows.len();
        let test_size = n / (WALK_FORWARD_SPLITS + 1);
        for fold in 0..WALK_FORWARD_SPLITS {
            let test_start = n - (WALK_FORWARD_SPLITS - fold) * test_size;
            let train_max = dataset.dates[..test_start].iter().max().unwrap();
            let test_min = dataset.dates[test_start..test_start + test_size]
                .iter()
                .min()
                .unwrap();
            assert!(train_max < test_min);
        }
    }

    #[test]
    fn cv_needs_enough_rows() {
        let days = engineered(2023, 4);
        let dataset = build_dataset(&days, FeatureSet::Baseline, Target::TotalLeads).unwrap();
        assert!(walk_forward_cv(&dataset, GbdtParams::default(), WALK_FORWARD_SPLITS).is_err());
    }

    #[test]
    fn holdout_ignores_partial_season_rows() {
        let mut days = Vec::new();
        for year in 2021..=2025 {
            days.extend(engineered(year, 40));
        }
        let config = AppConfig::default();
        let params = GbdtParams {
            n_trees: 30,
            ..GbdtParams::default()
        };
        let without_partial = holdout_validation(&days, &config, params).unwrap();

        days.extend(engineered(2026, 12));
        let with_partial = holdout_validation(&days, &config, params).unwrap();

        assert_eq!(without_partial.metrics.mae, with_partial.metrics.mae);
        assert_eq!(without_partial.total_predicted, with_partial.total_predicted);
        assert_eq!(without_partial.test_days, with_partial.test_days);
    }

    #[test]
    fn holdout_reports_dow_and_quality_buckets() {
        let mut days = Vec::new();
        for year in 2021..=2025 {
            days.extend(engineered(year, 40));
        }
        let config = AppConfig::default();
        let params = GbdtParams {
            n_trees: 30,
            ..GbdtParams::default()
        };
        let report = holdout_validation(&days, &config, params).unwrap();
        assert_eq!(report.test_year, 2025);
        assert!(!report.weekly.is_empty());
        assert_eq!(report.by_dow.len(), 7);
        for bucket in &report.by_quality {
            assert!(bucket.count >= config.min_bucket_samples);
        }
    }
}
