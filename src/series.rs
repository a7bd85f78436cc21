use crate::config::AppConfig;
use crate::models::{DailyRecord, MergedDay, WeatherRecord};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ARTIFACT_FILENAME: &str = "daily_leads_weather.csv";

/// Location of the merged daily table under the output directory.
pub fn artifact_path(config: &AppConfig) -> PathBuf {
    config.output_dir.join(ARTIFACT_FILENAME)
}

/// Left-joins weather observations onto the daily lead series by date. Days
/// without weather keep their lead counts and null weather fields.
pub fn merge(daily: &[DailyRecord], weather: &[WeatherRecord]) -> Vec<MergedDay> {
    let by_date: HashMap<NaiveDate, &WeatherRecord> =
        weather.iter().map(|record| (record.date, record)).collect();

    let merged: Vec<MergedDay> = daily
        .iter()
        .map(|record| MergedDay::from_parts(record, by_date.get(&record.date).copied()))
        .collect();

    let covered = merged.iter().filter(|day| day.temp_max.is_some()).count();
    info!(
        "Days with weather data: {}/{} ({:.0}%)",
        covered,
        merged.len(),
        if merged.is_empty() {
            0.0
        } else {
            covered as f64 / merged.len() as f64 * 100.0
        }
    );

    merged
}

/// Writes the merged daily table as a flat CSV artifact. The engineered and
/// momentum columns are recomputed on read, so only base columns persist.
pub fn write_artifact(path: &Path, days: &[MergedDay]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for day in days {
        writer
            .serialize(day)
            .with_context(|| format!("failed to write row for {}", day.date))?;
    }
    writer.flush()?;
    info!("Merged daily table written to {}", path.display());
    Ok(())
}

/// Reads the merged daily table back, date ascending and date-unique.
pub fn read_artifact(path: &Path) -> Result<Vec<MergedDay>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut days = Vec::new();
    for row in reader.deserialize::<MergedDay>() {
        days.push(row.with_context(|| format!("malformed row in {}", path.display()))?);
    }
    if days.is_empty() {
        return Err(anyhow!("{} contains no rows", path.display()));
    }
    days.sort_by_key(|day| day.date);
    for pair in days.windows(2) {
        if pair[0].date == pair[1].date {
            return Err(anyhow!(
                "{} contains duplicate rows for {}",
                path.display(),
                pair[0].date
            ));
        }
    }
    Ok(days)
}

/// Restricts the series to the named seasons, preserving date order.
pub fn filter_years(days: &[MergedDay], years: &[i32]) -> Vec<MergedDay> {
    days.iter()
        .filter(|day| years.contains(&day.year))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn sample_days() -> Vec<MergedDay> {
        let config = AppConfig::default();
        let mut days = Vec::new();
        for offset in 0..3 {
            let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Days::new(offset);
            let daily = DailyRecord::new(date, config.season_start, 10 + offset as u32, 2, 8);
            let weather = WeatherRecord {
                date,
                temp_max: Some(55.0),
                sunshine_hrs: Some(6.5),
                ..WeatherRecord::default()
            };
            days.push(MergedDay::from_parts(&daily, Some(&weather)));
        }
        days
    }

    #[test]
    fn merge_keeps_days_without_weather() {
        let config = AppConfig::default();
        let date_a = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let date_b = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let daily = vec![
            DailyRecord::new(date_a, config.season_start, 5, 0, 5),
            DailyRecord::new(date_b, config.season_start, 7, 1, 6),
        ];
        let weather = vec![WeatherRecord {
            date: date_a,
            temp_max: Some(61.0),
            ..WeatherRecord::default()
        }];
        let merged = merge(&daily, &weather);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].temp_max, Some(61.0));
        assert_eq!(merged[1].temp_max, None);
        assert_eq!(merged[1].total_leads, 7);
    }

    #[test]
    fn artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily_leads_weather.csv");
        let days = sample_days();
        write_artifact(&path, &days).unwrap();
        let loaded = read_artifact(&path).unwrap();
        assert_eq!(loaded.len(), days.len());
        assert_eq!(loaded[0].date, days[0].date);
        assert_eq!(loaded[2].total_leads, 12);
        assert_eq!(loaded[0].sunshine_hrs, Some(6.5));
        assert_eq!(loaded[0].snow_depth, None);
    }

    #[test]
    fn filter_years_keeps_order() {
        let days = sample_days();
        assert_eq!(filter_years(&days, &[2024]).len(), 3);
        assert!(filter_years(&days, &[2023]).is_empty());
    }
}
