use crate::config::AppConfig;
use crate::features::{feature_vector_raw, FeatureSet};
use crate::gbdt::GbdtModel;
use crate::metrics;
use crate::models::MergedDay;
use anyhow::{anyhow, Result};
use chrono::{Datelike, Days};
use serde::Serialize;
use std::collections::BTreeMap;

/// Builds counterfactual feature vectors by overriding fields of a complete
/// base vector. Override keys must belong to the feature schema; an unknown
/// key is a hard error, never silently dropped.
pub struct ScenarioBuilder {
    set: FeatureSet,
    base: Vec<f64>,
}

impl ScenarioBuilder {
    pub fn new(set: FeatureSet, base: Vec<f64>) -> Result<Self> {
        if base.len() != set.len() {
            return Err(anyhow!(
                "base vector width {} does not match schema width {}",
                base.len(),
                set.len()
            ));
        }
        Ok(Self { set, base })
    }

    pub fn base(&self) -> &[f64] {
        &self.base
    }

    pub fn apply(&self, overrides: &[(&str, f64)]) -> Result<Vec<f64>> {
        let names = self.set.names();
        let mut vector = self.base.clone();
        for (key, value) in overrides {
            let index = names
                .iter()
                .position(|name| name == key)
                .ok_or_else(|| anyhow!("scenario override names unknown feature {}", key))?;
            vector[index] = *value;
        }
        Ok(vector)
    }
}

/// Componentwise median of the historical feature values, skipping missing
/// observations per feature. The all-missing degenerate case medians to 0.
pub fn median_baseline(days: &[MergedDay], set: FeatureSet) -> Result<Vec<f64>> {
    if days.is_empty() {
        return Err(anyhow!("cannot build a baseline vector from zero days"));
    }
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); set.len()];
    for day in days {
        for (index, value) in feature_vector_raw(day, set)?.into_iter().enumerate() {
            if let Some(value) = value {
                columns[index].push(value);
            }
        }
    }
    Ok(columns.iter().map(|column| metrics::median(column)).collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario: String,
    pub predicted_leads: f64,
    pub vs_baseline_pct: f64,
}

/// The standing what-if table: weather archetypes on a mid-season Wednesday,
/// plus the Saturday variant of the best case.
pub fn default_scenarios() -> Vec<(&'static str, Vec<(&'static str, f64)>)> {
    vec![
        ("Typical Weekday (baseline)", vec![]),
        (
            "Sunny & Warm (70F, 10hrs sun)",
            vec![
                ("temp_max", 70.0),
                ("temp_mean", 60.0),
                ("sunshine_hrs", 10.0),
                ("precip_in", 0.0),
                ("snowfall_in", 0.0),
                ("is_snow", 0.0),
                ("is_rainy", 0.0),
                ("is_sunny", 1.0),
                ("is_weekend", 0.0),
                ("is_saturday", 0.0),
                ("dow", 2.0),
                ("temp_max_3d_avg", 68.0),
                ("sunshine_3d_avg", 9.0),
            ],
        ),
        (
            "Cloudy & Cool (50F, 3hrs sun)",
            vec![
                ("temp_max", 50.0),
                ("temp_mean", 42.0),
                ("sunshine_hrs", 3.0),
                ("precip_in", 0.0),
                ("snowfall_in", 0.0),
                ("is_snow", 0.0),
                ("is_rainy", 0.0),
                ("is_sunny", 0.0),
                ("is_weekend", 0.0),
                ("is_saturday", 0.0),
                ("dow", 2.0),
                ("temp_max_3d_avg", 52.0),
                ("sunshine_3d_avg", 4.0),
            ],
        ),
        (
            "Rainy Day (55F, 1hr sun)",
            vec![
                ("temp_max", 55.0),
                ("temp_mean", 48.0),
                ("sunshine_hrs", 1.0),
                ("precip_in", 0.5),
                ("snowfall_in", 0.0),
                ("is_snow", 0.0),
                ("is_rainy", 1.0),
                ("is_sunny", 0.0),
                ("is_weekend", 0.0),
                ("is_saturday", 0.0),
                ("dow", 2.0),
                ("temp_max_3d_avg", 55.0),
                ("sunshine_3d_avg", 3.0),
            ],
        ),
        (
            "Snow Day (35F, snow)",
            vec![
                ("temp_max", 35.0),
                ("temp_mean", 28.0),
                ("sunshine_hrs", 2.0),
                ("precip_in", 0.3),
                ("snowfall_in", 2.0),
                ("is_snow", 1.0),
                ("is_rainy", 0.0),
                ("is_sunny", 0.0),
                ("is_weekend", 0.0),
                ("is_saturday", 0.0),
                ("dow", 2.0),
                ("temp_max_3d_avg", 36.0),
                ("sunshine_3d_avg", 3.0),
            ],
        ),
        (
            "Peak Spring (65F, sunny, Wed)",
            vec![
                ("temp_max", 65.0),
                ("temp_mean", 55.0),
                ("sunshine_hrs", 9.0),
                ("precip_in", 0.0),
                ("snowfall_in", 0.0),
                ("is_snow", 0.0),
                ("is_rainy", 0.0),
                ("is_sunny", 1.0),
                ("is_weekend", 0.0),
                ("is_saturday", 0.0),
                ("dow", 2.0),
                ("day_of_season", 45.0),
                ("week_num", 14.0),
                ("temp_max_3d_avg", 63.0),
                ("sunshine_3d_avg", 8.0),
            ],
        ),
        (
            "Saturday (same as peak spring)",
            vec![
                ("temp_max", 65.0),
                ("temp_mean", 55.0),
                ("sunshine_hrs", 9.0),
                ("precip_in", 0.0),
                ("snowfall_in", 0.0),
                ("is_snow", 0.0),
                ("is_rainy", 0.0),
                ("is_sunny", 1.0),
                ("is_weekend", 1.0),
                ("is_saturday", 1.0),
                ("dow", 5.0),
                ("day_of_season", 45.0),
                ("week_num", 14.0),
                ("temp_max_3d_avg", 63.0),
                ("sunshine_3d_avg", 8.0),
            ],
        ),
    ]
}

/// Scores each scenario against the baseline prediction. Pure: a fixed model
/// and fixed overrides always produce the same table.
pub fn score_scenarios(
    model: &GbdtModel,
    builder: &ScenarioBuilder,
    scenarios: &[(&str, Vec<(&str, f64)>)],
) -> Result<Vec<ScenarioResult>> {
    let baseline_prediction = model.predict(builder.base())?;
    let mut results = Vec::with_capacity(scenarios.len());
    for (name, overrides) in scenarios {
        let vector = builder.apply(overrides)?;
        let predicted = model.predict(&vector)?;
        results.push(ScenarioResult {
            scenario: name.to_string(),
            predicted_leads: predicted,
            vs_baseline_pct: if baseline_prediction > 0.0 {
                (predicted / baseline_prediction - 1.0) * 100.0
            } else {
                0.0
            },
        });
    }
    Ok(results)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRow {
    pub day_of_season: i64,
    pub cal_week: u32,
    pub dow: u32,
    pub dow_name: String,
    pub predicted_leads: f64,
    pub historical_avg: f64,
    pub historical_std: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyProjection {
    pub cal_week: u32,
    pub avg_weekday_pred: f64,
    pub avg_saturday_pred: Option<f64>,
}

#[derive(Debug, Default)]
struct DayOfSeasonAverages {
    temp_max: Vec<f64>,
    temp_mean: Vec<f64>,
    sunshine_hrs: Vec<f64>,
    precip_in: Vec<f64>,
    snowfall_in: Vec<f64>,
    wind_max_mph: Vec<f64>,
    total_leads: Vec<f64>,
}

/// Synthetic-season baseline: for every observed day-of-season, average the
/// weather across years and predict each of the 7 weekdays under it. The
/// historical lead mean and spread ride along for band comparison.
pub fn seasonal_projection(
    model: &GbdtModel,
    days: &[MergedDay],
    config: &AppConfig,
) -> Result<Vec<ProjectionRow>> {
    let mut grouped: BTreeMap<i64, DayOfSeasonAverages> = BTreeMap::new();
    for day in days {
        let entry = grouped.entry(day.day_of_season).or_default();
        if let Some(v) = day.temp_max {
            entry.temp_max.push(v);
        }
        if let Some(v) = day.temp_mean {
            entry.temp_mean.push(v);
        }
        if let Some(v) = day.sunshine_hrs {
            entry.sunshine_hrs.push(v);
        }
        if let Some(v) = day.precip_in {
            entry.precip_in.push(v);
        }
        if let Some(v) = day.snowfall_in {
            entry.snowfall_in.push(v);
        }
        if let Some(v) = day.wind_max_mph {
            entry.wind_max_mph.push(v);
        }
        entry.total_leads.push(day.total_leads as f64);
    }
    if grouped.is_empty() {
        return Err(anyhow!("no historical days to project a season from"));
    }

    let reference_year = config
        .full_years
        .iter()
        .copied()
        .max()
        .unwrap_or(config.trend_base_year);
    let season_start = config.season_start_date(reference_year)?;
    let year_trend = config.latest_trend();
    let names = FeatureSet::Baseline.names();

    let mut rows = Vec::with_capacity(grouped.len() * 7);
    for (day_of_season, averages) in &grouped {
        let base_date = season_start
            .checked_add_days(Days::new(*day_of_season as u64))
            .ok_or_else(|| anyhow!("day of season {} out of range", day_of_season))?;
        let cal_week = base_date.iso_week().week();
        let month = base_date.month();

        let avg_temp_max = metrics::mean(&averages.temp_max);
        let avg_temp_mean = metrics::mean(&averages.temp_mean);
        let avg_sunshine = metrics::mean(&averages.sunshine_hrs);
        let avg_precip = metrics::mean(&averages.precip_in);
        let avg_snow = metrics::mean(&averages.snowfall_in);
        let avg_wind = metrics::mean(&averages.wind_max_mph);
        let historical_avg = metrics::mean(&averages.total_leads);
        let historical_std = metrics::sample_std_dev(&averages.total_leads);

        for dow in 0u32..7 {
            let vector: Vec<f64> = names
                .iter()
                .map(|&name| match name {
                    "dow" => dow as f64,
                    "is_weekend" => (dow >= 5) as u8 as f64,
                    "is_saturday" => (dow == 5) as u8 as f64,
                    "day_of_season" => *day_of_season as f64,
                    "week_num" => cal_week as f64,
                    "month" => month as f64,
                    "temp_max" => avg_temp_max,
                    "temp_mean" => avg_temp_mean,
                    "sunshine_hrs" => avg_sunshine,
                    "precip_in" => avg_precip,
                    "snowfall_in" => avg_snow,
                    "wind_max_mph" => avg_wind,
                    "is_snow" => (avg_snow > 0.05) as u8 as f64,
                    "is_rainy" => (avg_precip > 0.1) as u8 as f64,
                    "is_sunny" => (avg_sunshine >= 8.0) as u8 as f64,
                    "temp_max_3d_avg" => avg_temp_max,
                    "sunshine_3d_avg" => avg_sunshine,
                    "year_trend" => year_trend,
                    other => unreachable!("unhandled baseline feature {other}"),
                })
                .collect();
            rows.push(ProjectionRow {
                day_of_season: *day_of_season,
                cal_week,
                dow,
                dow_name: crate::trainer::DOW_NAMES[dow as usize].to_string(),
                predicted_leads: model.predict(&vector)?,
                historical_avg,
                historical_std,
            });
        }
    }
    Ok(rows)
}

/// Collapses the projection grid to per-calendar-week weekday and Saturday
/// averages.
pub fn weekly_projection(rows: &[ProjectionRow]) -> Vec<WeeklyProjection> {
    let mut weeks: BTreeMap<u32, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in rows {
        let entry = weeks.entry(row.cal_week).or_default();
        if row.dow < 5 {
            entry.0.push(row.predicted_leads);
        } else if row.dow == 5 {
            entry.1.push(row.predicted_leads);
        }
    }
    weeks
        .into_iter()
        .map(|(cal_week, (weekday, saturday))| WeeklyProjection {
            cal_week,
            avg_weekday_pred: metrics::mean(&weekday),
            avg_saturday_pred: if saturday.is_empty() {
                None
            } else {
                Some(metrics::mean(&saturday))
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GbdtParams;
    use crate::features::{self, FeatureSet};
    use crate::models::{DailyRecord, WeatherRecord};
    use crate::trainer::{build_dataset, Target};
    use chrono::NaiveDate;

    fn engineered_season(year: i32, count: usize) -> Vec<MergedDay> {
        let mut days: Vec<MergedDay> = (0..count)
            .map(|offset| {
                let date =
                    NaiveDate::from_ymd_opt(year, 2, 15).unwrap() + Days::new(offset as u64);
                let sunshine = (offset % 12) as f64;
                let temp = 40.0 + (offset % 30) as f64;
                // Leads rise with sun and warmth so the fitted surface is monotone-ish.
                let leads = (10.0 + 2.0 * sunshine + 0.5 * temp) as u32;
                let daily = DailyRecord::new(date, (2, 15), leads, 2, leads - 2);
                let weather = WeatherRecord {
                    date,
                    temp_max: Some(temp),
                    temp_mean: Some(temp - 8.0),
                    sunshine_hrs: Some(sunshine),
                    precip_in: Some(0.0),
                    ..WeatherRecord::default()
                };
                MergedDay::from_parts(&daily, Some(&weather))
            })
            .collect();
        features::engineer(&mut days, 2021);
        days
    }

    #[test]
    fn builder_rejects_unknown_override_keys() {
        let builder =
            ScenarioBuilder::new(FeatureSet::Baseline, vec![0.0; FeatureSet::Baseline.len()])
                .unwrap();
        assert!(builder.apply(&[("temp_max", 70.0)]).is_ok());
        assert!(builder.apply(&[("humidity", 0.5)]).is_err());
    }

    #[test]
    fn median_baseline_skips_missing_values() {
        let mut days = engineered_season(2023, 5);
        days[0].wind_max_mph = Some(10.0);
        days[1].wind_max_mph = Some(20.0);
        days[2].wind_max_mph = Some(30.0);
        // Remaining two days have no wind observation and must not drag the median.
        let baseline = median_baseline(&days, FeatureSet::Baseline).unwrap();
        let wind_index = FeatureSet::Baseline
            .names()
            .iter()
            .position(|&n| n == "wind_max_mph")
            .unwrap();
        assert_eq!(baseline[wind_index], 20.0);
    }

    #[test]
    fn scenario_scoring_is_deterministic_and_sun_helps() {
        let mut days = Vec::new();
        for year in 2021..=2024 {
            days.extend(engineered_season(year, 60));
        }
        let dataset = build_dataset(&days, FeatureSet::Baseline, Target::TotalLeads).unwrap();
        let params = GbdtParams {
            n_trees: 150,
            ..GbdtParams::default()
        };
        let model = GbdtModel::fit(
            &dataset.rows,
            &dataset.targets,
            &dataset.feature_set.names(),
            params,
        )
        .unwrap();

        let baseline = median_baseline(&days, FeatureSet::Baseline).unwrap();
        let builder = ScenarioBuilder::new(FeatureSet::Baseline, baseline).unwrap();
        let scenarios = default_scenarios();
        let first = score_scenarios(&model, &builder, &scenarios).unwrap();
        let second = score_scenarios(&model, &builder, &scenarios).unwrap();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.predicted_leads, b.predicted_leads);
        }

        // Sunny-and-warm must not predict below the learned baseline.
        let sunny = first
            .iter()
            .find(|r| r.scenario.starts_with("Sunny & Warm"))
            .unwrap();
        let base = first
            .iter()
            .find(|r| r.scenario.starts_with("Typical Weekday"))
            .unwrap();
        assert!(sunny.predicted_leads >= base.predicted_leads);
    }

    #[test]
    fn projection_covers_every_weekday_per_day_of_season() {
        let mut days = Vec::new();
        for year in 2021..=2023 {
            days.extend(engineered_season(year, 30));
        }
        let dataset = build_dataset(&days, FeatureSet::Baseline, Target::TotalLeads).unwrap();
        let params = GbdtParams {
            n_trees: 20,
            ..GbdtParams::default()
        };
        let model = GbdtModel::fit(
            &dataset.rows,
            &dataset.targets,
            &dataset.feature_set.names(),
            params,
        )
        .unwrap();
        let config = AppConfig {
            full_years: vec![2021, 2022, 2023],
            ..AppConfig::default()
        };
        let rows = seasonal_projection(&model, &days, &config).unwrap();
        assert_eq!(rows.len(), 30 * 7);
        assert!(rows.iter().all(|row| row.predicted_leads >= 0.0));
        let weekly = weekly_projection(&rows);
        assert!(!weekly.is_empty());
    }
}
