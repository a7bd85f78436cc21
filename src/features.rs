use crate::models::{MergedDay, WeatherQuality};
use anyhow::{anyhow, Result};

// Binary weather flag thresholds.
const IS_SNOW_SNOWFALL_IN: f64 = 0.05;
const IS_SNOW_DEPTH_IN: f64 = 0.5;
const IS_RAINY_IN: f64 = 0.1;
const IS_SUNNY_HRS: f64 = 8.0;
const ROLLING_WINDOW: usize = 3;

/// Feature columns of the baseline model, in model input order.
pub const BASELINE_FEATURES: [&str; 18] = [
    "dow",
    "is_weekend",
    "is_saturday",
    "day_of_season",
    "week_num",
    "month",
    "temp_max",
    "temp_mean",
    "sunshine_hrs",
    "precip_in",
    "snowfall_in",
    "wind_max_mph",
    "is_snow",
    "is_rainy",
    "is_sunny",
    "temp_max_3d_avg",
    "sunshine_3d_avg",
    "year_trend",
];

/// Additional columns of the momentum-enhanced model.
pub const MOMENTUM_FEATURES: [&str; 7] = [
    "nice_streak",
    "bad_streak",
    "temp_change_1d",
    "sunshine_change_1d",
    "weather_quality_num",
    "prev_quality_num",
    "is_pop_day",
];

/// Which feature schema a model is trained against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    Baseline,
    Momentum,
}

impl FeatureSet {
    pub fn names(&self) -> Vec<&'static str> {
        match self {
            FeatureSet::Baseline => BASELINE_FEATURES.to_vec(),
            FeatureSet::Momentum => {
                let mut names = BASELINE_FEATURES.to_vec();
                names.extend_from_slice(&MOMENTUM_FEATURES);
                names
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FeatureSet::Baseline => BASELINE_FEATURES.len(),
            FeatureSet::Momentum => BASELINE_FEATURES.len() + MOMENTUM_FEATURES.len(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeatureSet::Baseline => "baseline",
            FeatureSet::Momentum => "momentum",
        }
    }
}

fn mean_of_present<I: Iterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values.flatten() {
        sum += value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Attaches the derived feature columns to a date-ascending series. Rolling
/// windows are computed independently per year and never span a season
/// boundary.
pub fn engineer(days: &mut [MergedDay], trend_base_year: i32) {
    let mut index = 0;
    while index < days.len() {
        let year = days[index].year;
        let start = index;
        while index < days.len() && days[index].year == year {
            index += 1;
        }
        engineer_year(&mut days[start..index], trend_base_year);
    }
}

fn engineer_year(days: &mut [MergedDay], trend_base_year: i32) {
    for i in 0..days.len() {
        let window_start = i.saturating_sub(ROLLING_WINDOW - 1);
        let temp_max_3d_avg = mean_of_present(days[window_start..=i].iter().map(|d| d.temp_max));
        let sunshine_3d_avg =
            mean_of_present(days[window_start..=i].iter().map(|d| d.sunshine_hrs));

        let day = &mut days[i];
        day.derived = Some(crate::models::DerivedFeatures {
            is_snow: day.snowfall_in.unwrap_or(0.0) > IS_SNOW_SNOWFALL_IN
                || day.snow_depth.unwrap_or(0.0) > IS_SNOW_DEPTH_IN,
            is_rainy: day.rain_in.unwrap_or(0.0) > IS_RAINY_IN,
            is_sunny: day.sunshine_hrs.unwrap_or(0.0) >= IS_SUNNY_HRS,
            year_trend: (day.year - trend_base_year) as f64,
            temp_max_3d_avg,
            sunshine_3d_avg,
        });
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// One named feature value, with `None` meaning "no observation". Unknown
/// names and missing enrichment stages are contract violations, reported as
/// hard errors instead of silently narrowing the schema.
pub fn feature_value(day: &MergedDay, name: &str) -> Result<Option<f64>> {
    let derived = || {
        day.derived
            .as_ref()
            .ok_or_else(|| anyhow!("feature {} requested before feature engineering ran", name))
    };
    let momentum = || {
        day.momentum
            .as_ref()
            .ok_or_else(|| anyhow!("feature {} requested before momentum tracking ran", name))
    };

    Ok(match name {
        "dow" => Some(day.dow as f64),
        "is_weekend" => Some(flag(day.is_weekend)),
        "is_saturday" => Some(flag(day.is_saturday)),
        "day_of_season" => Some(day.day_of_season as f64),
        "week_num" => Some(day.week_num as f64),
        "month" => Some(day.month as f64),
        "temp_max" => day.temp_max,
        "temp_mean" => day.temp_mean,
        "sunshine_hrs" => day.sunshine_hrs,
        "precip_in" => day.precip_in,
        "snowfall_in" => day.snowfall_in,
        "wind_max_mph" => day.wind_max_mph,
        "is_snow" => Some(flag(derived()?.is_snow)),
        "is_rainy" => Some(flag(derived()?.is_rainy)),
        "is_sunny" => Some(flag(derived()?.is_sunny)),
        "temp_max_3d_avg" => derived()?.temp_max_3d_avg,
        "sunshine_3d_avg" => derived()?.sunshine_3d_avg,
        "year_trend" => Some(derived()?.year_trend),
        "nice_streak" => Some(momentum()?.nice_streak as f64),
        "bad_streak" => Some(momentum()?.bad_streak as f64),
        "temp_change_1d" => Some(momentum()?.temp_change_1d),
        "sunshine_change_1d" => Some(momentum()?.sunshine_change_1d),
        "weather_quality_num" => Some(WeatherQuality::encode(Some(momentum()?.quality))),
        "prev_quality_num" => Some(WeatherQuality::encode(momentum()?.prev_quality)),
        "is_pop_day" => Some(flag(momentum()?.is_pop_day)),
        other => return Err(anyhow!("unknown feature {}", other)),
    })
}

/// Model input vector. Missing observations become 0 here and nowhere
/// earlier; every domain-specific default has already been applied upstream.
pub fn feature_vector(day: &MergedDay, set: FeatureSet) -> Result<Vec<f64>> {
    set.names()
        .iter()
        .map(|name| Ok(feature_value(day, name)?.unwrap_or(0.0)))
        .collect()
}

/// Feature values with missingness preserved, for statistics that must skip
/// absent observations (e.g. the scenario baseline medians).
pub fn feature_vector_raw(day: &MergedDay, set: FeatureSet) -> Result<Vec<Option<f64>>> {
    set.names()
        .iter()
        .map(|name| feature_value(day, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyRecord, MergedDay, WeatherRecord};
    use chrono::NaiveDate;

    fn series(year: i32, temps: &[Option<f64>]) -> Vec<MergedDay> {
        temps
            .iter()
            .enumerate()
            .map(|(offset, temp)| {
                let date = NaiveDate::from_ymd_opt(year, 2, 15).unwrap()
                    + chrono::Days::new(offset as u64);
                let daily = DailyRecord::new(date, (2, 15), 10, 0, 10);
                let weather = WeatherRecord {
                    date,
                    temp_max: *temp,
                    sunshine_hrs: Some(5.0),
                    ..WeatherRecord::default()
                };
                MergedDay::from_parts(&daily, Some(&weather))
            })
            .collect()
    }

    #[test]
    fn rolling_window_starts_at_one_observation() {
        let mut days = series(2023, &[Some(40.0), Some(50.0), Some(60.0), Some(70.0)]);
        engineer(&mut days, 2021);
        let avg = |i: usize| days[i].derived.as_ref().unwrap().temp_max_3d_avg.unwrap();
        assert_eq!(avg(0), 40.0);
        assert_eq!(avg(1), 45.0);
        assert_eq!(avg(2), 50.0);
        assert_eq!(avg(3), 60.0);
    }

    #[test]
    fn rolling_window_never_spans_years() {
        let mut days = series(2022, &[Some(80.0), Some(80.0)]);
        days.extend(series(2023, &[Some(40.0)]));
        engineer(&mut days, 2021);
        let first_2023 = days[2].derived.as_ref().unwrap();
        assert_eq!(first_2023.temp_max_3d_avg, Some(40.0));
        assert_eq!(first_2023.year_trend, 2.0);
    }

    #[test]
    fn rolling_window_skips_missing_observations() {
        let mut days = series(2023, &[Some(40.0), None, Some(60.0)]);
        engineer(&mut days, 2021);
        let derived = days[1].derived.as_ref().unwrap();
        assert_eq!(derived.temp_max_3d_avg, Some(40.0));
        let derived = days[2].derived.as_ref().unwrap();
        assert_eq!(derived.temp_max_3d_avg, Some(50.0));
    }

    #[test]
    fn binary_flags_treat_missing_as_dry() {
        let mut days = series(2023, &[None]);
        days[0].snowfall_in = None;
        days[0].rain_in = Some(0.2);
        engineer(&mut days, 2021);
        let derived = days[0].derived.as_ref().unwrap();
        assert!(!derived.is_snow);
        assert!(derived.is_rainy);
        assert!(!derived.is_sunny);
    }

    #[test]
    fn vector_fails_loudly_without_enrichment() {
        let days = series(2023, &[Some(50.0)]);
        assert!(feature_vector(&days[0], FeatureSet::Baseline).is_err());
        assert!(feature_value(&days[0], "no_such_feature").is_err());
    }

    #[test]
    fn vector_fills_missing_with_zero_at_boundary_only() {
        let mut days = series(2023, &[None]);
        engineer(&mut days, 2021);
        let raw = feature_vector_raw(&days[0], FeatureSet::Baseline).unwrap();
        let filled = feature_vector(&days[0], FeatureSet::Baseline).unwrap();
        let temp_index = BASELINE_FEATURES
            .iter()
            .position(|&n| n == "temp_max")
            .unwrap();
        assert_eq!(raw[temp_index], None);
        assert_eq!(filled[temp_index], 0.0);
        assert_eq!(filled.len(), FeatureSet::Baseline.len());
    }

    #[test]
    fn momentum_set_extends_baseline() {
        let names = FeatureSet::Momentum.names();
        assert_eq!(names.len(), 25);
        assert_eq!(names[0], "dow");
        assert_eq!(names[names.len() - 1], "is_pop_day");
    }
}
