use crate::config::{AppConfig, GbdtParams};
use crate::features::{self, FeatureSet};
use crate::models::MergedDay;
use crate::trainer::{build_dataset, train_and_evaluate, Target};
use crate::weather::WeatherClient;
use crate::{analysis, ingest, report, scenario, series};
use anyhow::Result;
use log::info;
use serde_json::json;

/// The full pipeline: ingest leads, fetch weather, merge, write the artifact,
/// run the exploratory summaries, train both models and emit every report.
pub fn run(config: &AppConfig, params: GbdtParams) -> Result<()> {
    let daily = ingest::load_daily_leads(config)?;
    info!(
        "Daily records: {} ({} to {})",
        daily.len(),
        daily.first().map(|d| d.date.to_string()).unwrap_or_default(),
        daily.last().map(|d| d.date.to_string()).unwrap_or_default()
    );

    let client = WeatherClient::new()?;
    let today = chrono::Local::now().date_naive();
    let weather = client.fetch_all(config, today)?;
    let merged = series::merge(&daily, &weather);
    series::write_artifact(&series::artifact_path(config), &merged)?;

    let mut full_years = series::filter_years(&merged, &config.full_years);

    // Exploratory summaries over the complete seasons.
    let yearly = analysis::yearly_summary(&full_years);
    let dow = analysis::dow_stats(&full_years);
    let weekly = analysis::weekly_curve(&full_years);
    let conditions = analysis::condition_impact(&full_years, config.min_bucket_samples);
    let temperature = analysis::temperature_buckets(&full_years, config.min_bucket_samples);
    let sunshine = analysis::sunshine_buckets(&full_years, config.min_bucket_samples);
    let precipitation = analysis::precipitation_buckets(&full_years, config.min_bucket_samples);
    let cross = analysis::day_type_condition_cross(&full_years, config.min_bucket_samples);

    report::write_csv(config, "yearly_summary.csv", &yearly)?;
    report::write_csv(config, "dow_analysis.csv", &dow)?;
    report::write_csv(config, "weekly_curve.csv", &weekly)?;
    report::write_csv(config, "weather_condition_impact.csv", &conditions)?;
    report::write_csv(config, "temperature_impact.csv", &temperature)?;
    report::write_csv(config, "sunshine_impact.csv", &sunshine)?;
    report::write_csv(config, "precipitation_impact.csv", &precipitation)?;
    report::write_csv(config, "day_type_condition_cross.csv", &cross)?;

    // Season-phase interaction tables.
    let phase_effects = analysis::phase_weather_effects(&full_years, config.min_bucket_samples);
    let temp_vs_normal = analysis::temp_vs_normal_effects(&full_years, config.min_bucket_samples);
    report::write_json(
        config,
        "seasonal_phase_analysis.json",
        &json!({
            "phaseWeatherImpact": phase_effects,
            "tempAboveBelowNormal": temp_vs_normal,
        }),
    )?;

    if let Some(dm) = analysis::dm_timing(&full_years, config.min_bucket_samples) {
        report::write_json(config, "dm_timing.json", &dm)?;
    } else {
        info!("No direct-mail lead data; skipping the DM timing report");
    }

    // Model training: total and organic targets share the feature set and
    // are fit independently, so the two fits run in parallel.
    features::engineer(&mut full_years, config.trend_base_year);
    let total_dataset = build_dataset(&full_years, FeatureSet::Baseline, Target::TotalLeads)?;
    let organic_dataset = build_dataset(&full_years, FeatureSet::Baseline, Target::OrganicLeads)?;
    info!(
        "Training samples: {} ({} features)",
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

    // Counterfactual scenarios against the median-day baseline.
    let model_days: Vec<MergedDay> = full_years
        .iter()
        .filter(|day| day.has_core_weather())
        .cloned()
        .collect();
    let baseline = scenario::median_baseline(&model_days, FeatureSet::Baseline)?;
    let builder = scenario::ScenarioBuilder::new(FeatureSet::Baseline, baseline)?;
    let scenarios = scenario::default_scenarios();
    let scenario_results = scenario::score_scenarios(&total.model, &builder, &scenarios)?;
    report::write_csv(config, "weather_uplift_scenarios.csv", &scenario_results)?;

    // Synthetic-season projection grid.
    let projection = scenario::seasonal_projection(&total.model, &model_days, config)?;
    report::write_csv(config, "seasonal_projection.csv", &projection)?;
    report::write_csv(
        config,
        "weekly_projection.csv",
        &scenario::weekly_projection(&projection),
    )?;

    let quality_impacts = analysis::quality_impact(&full_years, config);
    let summary = report::build_summary(
        config,
        &full_years,
        &yearly,
        &dow,
        &quality_impacts,
        &total.cv,
        &total.in_sample,
    );
    report::write_json(config, "analysis_report.json", &summary)?;

    info!(
        "Analysis complete: total-leads CV MAE {:.2}, organic CV MAE {:.2}",
        total.cv.mean_mae, organic.cv.mean_mae
    );
    Ok(())
}
