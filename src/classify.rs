use crate::models::{MergedDay, WeatherCondition, WeatherQuality};

// Tuned thresholds; the priority order below is load-bearing for every
// downstream bucket statistic.
const SNOWFALL_IN: f64 = 0.1;
const SNOW_DEPTH_IN: f64 = 1.0;
const RAIN_HEAVY_IN: f64 = 0.25;
const RAIN_LIGHT_IN: f64 = 0.05;
const SUNNY_HRS: f64 = 8.0;
const PARTLY_CLOUDY_HRS: f64 = 4.0;

const QUALITY_PRECIP_IN: f64 = 0.2;
const NICE_SUN_HRS: f64 = 7.0;
const NICE_TEMP_F: f64 = 55.0;
const OK_SUN_HRS: f64 = 5.0;
const OK_TEMP_F: f64 = 50.0;
const BAD_SUN_HRS: f64 = 3.0;
const BAD_TEMP_F: f64 = 42.0;

/// Neutral substitute for a missing max temperature, in Fahrenheit. The other
/// fields default to zero; temperature has no meaningful zero in this range.
const DEFAULT_TEMP_MAX_F: f64 = 50.0;

/// Maps a day's numeric weather to the coarse 6-way descriptive label.
/// Total over missing fields: each absent observation takes its neutral
/// default before the rules run, so an all-missing day classifies as
/// Cloudy/Overcast rather than failing or masquerading as Sunny.
pub fn classify_condition(day: &MergedDay) -> WeatherCondition {
    let snowfall = day.snowfall_in.unwrap_or(0.0);
    let snow_depth = day.snow_depth.unwrap_or(0.0);
    let rain = day.rain_in.unwrap_or(0.0);
    let sunshine = day.sunshine_hrs.unwrap_or(0.0);

    if snowfall > SNOWFALL_IN || snow_depth > SNOW_DEPTH_IN {
        return WeatherCondition::Snow;
    }
    if rain > RAIN_HEAVY_IN {
        return WeatherCondition::Rain;
    }
    if rain > RAIN_LIGHT_IN {
        return WeatherCondition::LightRain;
    }
    if sunshine >= SUNNY_HRS {
        return WeatherCondition::Sunny;
    }
    if sunshine >= PARTLY_CLOUDY_HRS {
        return WeatherCondition::PartlyCloudy;
    }
    WeatherCondition::Cloudy
}

/// Maps a day's numeric weather to the 3-way quality label driving the
/// momentum logic. Same totality rule as `classify_condition`.
pub fn classify_quality(day: &MergedDay) -> WeatherQuality {
    let snowfall = day.snowfall_in.unwrap_or(0.0);
    let snow_depth = day.snow_depth.unwrap_or(0.0);
    let precip = day.precip_in.unwrap_or(0.0);
    let sunshine = day.sunshine_hrs.unwrap_or(0.0);
    let temp_max = day.temp_max.unwrap_or(DEFAULT_TEMP_MAX_F);

    if snowfall > SNOWFALL_IN || snow_depth > SNOW_DEPTH_IN {
        return WeatherQuality::Bad;
    }
    if precip > QUALITY_PRECIP_IN {
        return WeatherQuality::Bad;
    }
    if sunshine >= NICE_SUN_HRS && temp_max >= NICE_TEMP_F {
        return WeatherQuality::Nice;
    }
    if sunshine >= OK_SUN_HRS && temp_max >= OK_TEMP_F {
        return WeatherQuality::Ok;
    }
    if sunshine < BAD_SUN_HRS || temp_max < BAD_TEMP_F {
        return WeatherQuality::Bad;
    }
    WeatherQuality::Ok
}
