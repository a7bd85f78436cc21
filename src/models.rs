use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One calendar day of aggregated lead counts inside the season window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// 0 = Monday .. 6 = Sunday.
    pub dow: u32,
    /// ISO week number.
    pub week_num: u32,
    pub is_weekend: bool,
    pub is_saturday: bool,
    pub is_sunday: bool,
    /// Zero-based offset from the season start (Feb 15) of this year.
    pub day_of_season: i64,
    pub total_leads: u32,
    pub dm_leads: u32,
    pub organic_leads: u32,
}

impl DailyRecord {
    pub fn new(
        date: NaiveDate,
        season_start: (u32, u32),
        total_leads: u32,
        dm_leads: u32,
        organic_leads: u32,
    ) -> Self {
        let dow = date.weekday().num_days_from_monday();
        let season_anchor =
            NaiveDate::from_ymd_opt(date.year(), season_start.0, season_start.1).unwrap_or(date);
        Self {
            date,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            dow,
            week_num: date.iso_week().week(),
            is_weekend: dow >= 5,
            is_saturday: dow == 5,
            is_sunday: dow == 6,
            day_of_season: (date - season_anchor).num_days(),
            total_leads,
            dm_leads,
            organic_leads,
        }
    }
}

/// One calendar day of weather observations for the reference location.
/// Any field may be missing; absence means "no observation", never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub date: NaiveDate,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_mean: Option<f64>,
    pub precip_in: Option<f64>,
    pub snowfall_in: Option<f64>,
    pub snow_depth: Option<f64>,
    pub sunshine_hrs: Option<f64>,
    pub rain_in: Option<f64>,
    pub wind_max_mph: Option<f64>,
    pub solar_radiation: Option<f64>,
}

/// Coarse 6-way descriptive weather label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherCondition {
    Snow,
    Rain,
    LightRain,
    Sunny,
    PartlyCloudy,
    Cloudy,
}

impl WeatherCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Snow => "Snow",
            WeatherCondition::Rain => "Rain",
            WeatherCondition::LightRain => "Light Rain",
            WeatherCondition::Sunny => "Sunny",
            WeatherCondition::PartlyCloudy => "Partly Cloudy",
            WeatherCondition::Cloudy => "Cloudy/Overcast",
        }
    }

    pub fn all() -> [WeatherCondition; 6] {
        [
            WeatherCondition::Snow,
            WeatherCondition::Rain,
            WeatherCondition::LightRain,
            WeatherCondition::Sunny,
            WeatherCondition::PartlyCloudy,
            WeatherCondition::Cloudy,
        ]
    }
}

/// 3-way weather quality label used by the momentum logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherQuality {
    Nice,
    Ok,
    Bad,
}

impl WeatherQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherQuality::Nice => "nice",
            WeatherQuality::Ok => "ok",
            WeatherQuality::Bad => "bad",
        }
    }

    /// Numeric encoding used as a model feature: nice=2, ok=1, bad=0.
    /// Absent labels encode as 1.
    pub fn encode(quality: Option<WeatherQuality>) -> f64 {
        match quality {
            Some(WeatherQuality::Nice) => 2.0,
            Some(WeatherQuality::Ok) => 1.0,
            Some(WeatherQuality::Bad) => 0.0,
            None => 1.0,
        }
    }

    pub fn all() -> [WeatherQuality; 3] {
        [
            WeatherQuality::Nice,
            WeatherQuality::Ok,
            WeatherQuality::Bad,
        ]
    }
}

/// Derived model features attached by the feature engineer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub is_snow: bool,
    pub is_rainy: bool,
    pub is_sunny: bool,
    pub year_trend: f64,
    /// Trailing 3-day average within this year's season, minimum one observation.
    pub temp_max_3d_avg: Option<f64>,
    pub sunshine_3d_avg: Option<f64>,
}

/// Streak and transition features attached by the momentum tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumFeatures {
    pub quality: WeatherQuality,
    /// Consecutive nice days ending at (and including) this day.
    pub nice_streak: u32,
    pub bad_streak: u32,
    pub prev_quality: Option<WeatherQuality>,
    pub prev2_quality: Option<WeatherQuality>,
    pub temp_change_1d: f64,
    pub sunshine_change_1d: f64,
    /// Nice day immediately after a bad day.
    pub is_pop_day: bool,
}

/// DailyRecord left-joined with its weather observation, enriched in place by
/// the later pipeline stages. The original count fields never change after
/// construction; `derived` and `momentum` start empty and are attached once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedDay {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub dow: u32,
    pub week_num: u32,
    pub is_weekend: bool,
    pub is_saturday: bool,
    pub is_sunday: bool,
    pub day_of_season: i64,
    pub total_leads: u32,
    pub dm_leads: u32,
    pub organic_leads: u32,

    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_mean: Option<f64>,
    pub precip_in: Option<f64>,
    pub snowfall_in: Option<f64>,
    pub snow_depth: Option<f64>,
    pub sunshine_hrs: Option<f64>,
    pub rain_in: Option<f64>,
    pub wind_max_mph: Option<f64>,
    pub solar_radiation: Option<f64>,

    #[serde(skip)]
    pub derived: Option<DerivedFeatures>,
    #[serde(skip)]
    pub momentum: Option<MomentumFeatures>,
}

impl MergedDay {
    pub fn from_parts(daily: &DailyRecord, weather: Option<&WeatherRecord>) -> Self {
        Self {
            date: daily.date,
            year: daily.year,
            month: daily.month,
            day: daily.day,
            dow: daily.dow,
            week_num: daily.week_num,
            is_weekend: daily.is_weekend,
            is_saturday: daily.is_saturday,
            is_sunday: daily.is_sunday,
            day_of_season: daily.day_of_season,
            total_leads: daily.total_leads,
            dm_leads: daily.dm_leads,
            organic_leads: daily.organic_leads,
            temp_max: weather.and_then(|w| w.temp_max),
            temp_min: weather.and_then(|w| w.temp_min),
            temp_mean: weather.and_then(|w| w.temp_mean),
            precip_in: weather.and_then(|w| w.precip_in),
            snowfall_in: weather.and_then(|w| w.snowfall_in),
            snow_depth: weather.and_then(|w| w.snow_depth),
            sunshine_hrs: weather.and_then(|w| w.sunshine_hrs),
            rain_in: weather.and_then(|w| w.rain_in),
            wind_max_mph: weather.and_then(|w| w.wind_max_mph),
            solar_radiation: weather.and_then(|w| w.solar_radiation),
            derived: None,
            momentum: None,
        }
    }

    /// Rows entering model training need the two core weather observations.
    pub fn has_core_weather(&self) -> bool {
        self.temp_max.is_some() && self.sunshine_hrs.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_record_calendar_fields() {
        // 2025-02-15 is a Saturday.
        let date = NaiveDate::from_ymd_opt(2025, 2, 15).unwrap();
        let record = DailyRecord::new(date, (2, 15), 12, 3, 9);
        assert_eq!(record.dow, 5);
        assert!(record.is_saturday);
        assert!(record.is_weekend);
        assert!(!record.is_sunday);
        assert_eq!(record.day_of_season, 0);
        assert_eq!(record.year, 2025);
    }

    #[test]
    fn day_of_season_offsets_from_feb_15() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let record = DailyRecord::new(date, (2, 15), 0, 0, 0);
        // 2024 is a leap year: Feb 15 -> May 10 spans 85 days.
        assert_eq!(record.day_of_season, 85);
    }

    #[test]
    fn quality_encoding_defaults_to_ok() {
        assert_eq!(WeatherQuality::encode(Some(WeatherQuality::Nice)), 2.0);
        assert_eq!(WeatherQuality::encode(Some(WeatherQuality::Bad)), 0.0);
        assert_eq!(WeatherQuality::encode(None), 1.0);
    }
}
