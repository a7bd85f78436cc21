use crate::config::AppConfig;
use crate::models::WeatherRecord;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DAILY_VARIABLES: &str = "temperature_2m_max,temperature_2m_min,temperature_2m_mean,\
precipitation_sum,snowfall_sum,snow_depth_mean,sunshine_duration,rain_sum,\
wind_speed_10m_max,shortwave_radiation_sum";
const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather archive returned no seasons; a model cannot be produced without weather data")]
    NoSeasons,
}

/// Daily arrays as the archive API returns them: parallel columns keyed by
/// date string, each value independently nullable.
#[derive(Debug, Deserialize, Default)]
struct ArchiveDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_mean: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    snowfall_sum: Vec<Option<f64>>,
    #[serde(default)]
    snow_depth_mean: Vec<Option<f64>>,
    #[serde(default)]
    sunshine_duration: Vec<Option<f64>>,
    #[serde(default)]
    rain_sum: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    shortwave_radiation_sum: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    daily: Option<ArchiveDaily>,
}

pub struct WeatherClient {
    http: Client,
}

impl WeatherClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build weather archive HTTP client")?;
        Ok(Self { http })
    }

    /// Fetches one season of daily weather for the configured location.
    /// Returns an empty vector when the season has not started yet.
    pub fn fetch_season(
        &self,
        config: &AppConfig,
        year: i32,
        today: NaiveDate,
    ) -> Result<Vec<WeatherRecord>> {
        let start_date = config.season_start_date(year)?;
        let mut end_date = config.season_end_date(year)?;
        if start_date > today {
            return Ok(Vec::new());
        }
        if end_date > today {
            end_date = today;
        }

        let response: ArchiveResponse = self
            .http
            .get(ARCHIVE_URL)
            .query(&[
                ("latitude", config.latitude.to_string()),
                ("longitude", config.longitude.to_string()),
                ("start_date", start_date.format("%Y-%m-%d").to_string()),
                ("end_date", end_date.format("%Y-%m-%d").to_string()),
                ("daily", DAILY_VARIABLES.to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("wind_speed_unit", "mph".to_string()),
                ("precipitation_unit", "inch".to_string()),
                ("timezone", config.timezone.clone()),
            ])
            .send()
            .with_context(|| format!("weather archive request for {year} failed"))?
            .error_for_status()
            .with_context(|| format!("weather archive rejected the {year} request"))?
            .json()
            .with_context(|| format!("weather archive returned invalid JSON for {year}"))?;

        let Some(daily) = response.daily else {
            return Ok(Vec::new());
        };
        parse_daily(daily)
    }

    /// Fetches weather for every configured season plus the in-progress one.
    /// A failed season is skipped with a warning; zero fetched seasons aborts
    /// the run since the core cannot model without weather.
    pub fn fetch_all(&self, config: &AppConfig, today: NaiveDate) -> Result<Vec<WeatherRecord>> {
        let mut records = Vec::new();
        let mut seasons = 0usize;

        let mut years = config.full_years.clone();
        years.push(config.partial_year);
        for year in years {
            info!("Fetching weather for {year}...");
            match self.fetch_season(config, year, today) {
                Ok(season) if !season.is_empty() => {
                    info!("  -> {} days", season.len());
                    seasons += 1;
                    records.extend(season);
                }
                Ok(_) => info!("  -> no data"),
                Err(err) => warn!("  -> skipping {year}: {err:#}"),
            }
        }

        if seasons == 0 {
            return Err(WeatherError::NoSeasons.into());
        }
        Ok(records)
    }
}

fn column(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

fn parse_daily(daily: ArchiveDaily) -> Result<Vec<WeatherRecord>> {
    let mut records = Vec::with_capacity(daily.time.len());
    for (index, raw_date) in daily.time.iter().enumerate() {
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .with_context(|| format!("archive returned unparseable date {raw_date}"))?;
        records.push(WeatherRecord {
            date,
            temp_max: column(&daily.temperature_2m_max, index),
            temp_min: column(&daily.temperature_2m_min, index),
            temp_mean: column(&daily.temperature_2m_mean, index),
            precip_in: column(&daily.precipitation_sum, index),
            snowfall_in: column(&daily.snowfall_sum, index),
            snow_depth: column(&daily.snow_depth_mean, index),
            sunshine_hrs: column(&daily.sunshine_duration, index)
                .map(|seconds| seconds / SECONDS_PER_HOUR),
            rain_in: column(&daily.rain_sum, index),
            wind_max_mph: column(&daily.wind_speed_10m_max, index),
            solar_radiation: column(&daily.shortwave_radiation_sum, index),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_daily_converts_sunshine_and_keeps_gaps() {
        let daily = ArchiveDaily {
            time: vec!["2024-02-15".to_string(), "2024-02-16".to_string()],
            temperature_2m_max: vec![Some(48.2), None],
            sunshine_duration: vec![Some(28_800.0), Some(0.0)],
            ..ArchiveDaily::default()
        };
        let records = parse_daily(daily).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sunshine_hrs, Some(8.0));
        assert_eq!(records[0].temp_max, Some(48.2));
        // A null stays unknown; a reported zero stays zero.
        assert_eq!(records[1].temp_max, None);
        assert_eq!(records[1].sunshine_hrs, Some(0.0));
    }

    #[test]
    fn parse_daily_rejects_bad_dates() {
        let daily = ArchiveDaily {
            time: vec!["15 Feb 2024".to_string()],
            ..ArchiveDaily::default()
        };
        assert!(parse_daily(daily).is_err());
    }
}
