use crate::config::{AppConfig, GbdtParams};
use crate::features::{self, FeatureSet};
use crate::gbdt::GbdtModel;
use crate::models::MergedDay;
use crate::trainer::{build_dataset, Target};
use crate::{report, scenario, series};
use anyhow::Result;
use log::info;

/// Fits the total-leads model from the artifact and emits the what-if
/// scenario table plus the synthetic-season projection grid.
pub fn run(config: &AppConfig, params: GbdtParams) -> Result<()> {
    let merged = series::read_artifact(&series::artifact_path(config))?;
    let mut full_years = series::filter_years(&merged, &config.full_years);
    features::engineer(&mut full_years, config.trend_base_year);

    let dataset = build_dataset(&full_years, FeatureSet::Baseline, Target::TotalLeads)?;
    let model = GbdtModel::fit(&dataset.rows, &dataset.targets, &dataset.feature_set.names(), params)?;

    let model_days: Vec<MergedDay> = full_years
        .iter()
        .filter(|day| day.has_core_weather())
        .cloned()
        .collect();
    let baseline = scenario::median_baseline(&model_days, FeatureSet::Baseline)?;
    let builder = scenario::ScenarioBuilder::new(FeatureSet::Baseline, baseline)?;
    let scenarios = scenario::default_scenarios();
    let results = scenario::score_scenarios(&model, &builder, &scenarios)?;
    for result in &results {
        info!(
            "  {:<34} {:>5.0} leads ({:+.0}% vs baseline)",
            result.scenario, result.predicted_leads, result.vs_baseline_pct
        );
    }
    report::write_csv(config, "weather_uplift_scenarios.csv", &results)?;

    let projection = scenario::seasonal_projection(&model, &model_days, config)?;
    report::write_csv(config, "seasonal_projection.csv", &projection)?;
    report::write_csv(
        config,
        "weekly_projection.csv",
        &scenario::weekly_projection(&projection),
    )?;
    info!(
        "Projection grid: {} (day-of-season x weekday) rows",
        projection.len()
    );
    Ok(())
}
