use crate::classify::{classify_condition, classify_quality};
use crate::config::AppConfig;
use crate::metrics;
use crate::models::{MergedDay, WeatherCondition, WeatherQuality};
use crate::trainer::DOW_NAMES;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlySummary {
    pub year: i32,
    pub total: u32,
    pub days: usize,
    pub daily_avg: f64,
    pub dm_total: u32,
    pub organic_total: u32,
    pub dm_pct: f64,
    pub yoy_growth_pct: Option<f64>,
}

/// Season totals per year with year-over-year growth and direct-mail share.
pub fn yearly_summary(days: &[MergedDay]) -> Vec<YearlySummary> {
    let mut grouped: BTreeMap<i32, Vec<&MergedDay>> = BTreeMap::new();
    for day in days {
        grouped.entry(day.year).or_default().push(day);
    }

    let mut summaries: Vec<YearlySummary> = Vec::with_capacity(grouped.len());
    for (year, year_days) in grouped {
        let total: u32 = year_days.iter().map(|d| d.total_leads).sum();
        let dm_total: u32 = year_days.iter().map(|d| d.dm_leads).sum();
        let organic_total: u32 = year_days.iter().map(|d| d.organic_leads).sum();
        let yoy_growth_pct = summaries.last().and_then(|prev: &YearlySummary| {
            if prev.total > 0 {
                Some((total as f64 / prev.total as f64 - 1.0) * 100.0)
            } else {
                None
            }
        });
        summaries.push(YearlySummary {
            year,
            total,
            days: year_days.len(),
            daily_avg: total as f64 / year_days.len().max(1) as f64,
            dm_total,
            organic_total,
            dm_pct: if total > 0 {
                dm_total as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            yoy_growth_pct,
        });
    }
    summaries
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DowStats {
    pub dow: u32,
    pub dow_name: String,
    pub avg_total: f64,
    pub avg_organic: f64,
    pub avg_dm: f64,
    pub median_total: f64,
    pub count: usize,
    /// Lead multiplier expressed as percent vs the Mon-Fri average.
    pub pct_vs_weekday_avg: f64,
}

/// Day-of-week lead profile; the percent column is the day-of-week multiplier.
pub fn dow_stats(days: &[MergedDay]) -> Vec<DowStats> {
    let weekday_totals: Vec<f64> = days
        .iter()
        .filter(|day| day.dow < 5)
        .map(|day| day.total_leads as f64)
        .collect();
    let weekday_avg = metrics::mean(&weekday_totals);

    (0u32..7)
        .filter_map(|dow| {
            let group: Vec<&MergedDay> = days.iter().filter(|day| day.dow == dow).collect();
            if group.is_empty() {
                return None;
            }
            let totals: Vec<f64> = group.iter().map(|d| d.total_leads as f64).collect();
            let avg_total = metrics::mean(&totals);
            Some(DowStats {
                dow,
                dow_name: DOW_NAMES[dow as usize].to_string(),
                avg_total,
                avg_organic: metrics::mean(
                    &group
                        .iter()
                        .map(|d| d.organic_leads as f64)
                        .collect::<Vec<_>>(),
                ),
                avg_dm: metrics::mean(
                    &group.iter().map(|d| d.dm_leads as f64).collect::<Vec<_>>(),
                ),
                median_total: metrics::median(&totals),
                count: group.len(),
                pct_vs_weekday_avg: if weekday_avg > 0.0 {
                    (avg_total / weekday_avg - 1.0) * 100.0
                } else {
                    0.0
                },
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyCurvePoint {
    pub week_num: u32,
    pub avg_total: f64,
    pub avg_organic: f64,
    pub avg_dm: f64,
}

/// Cross-year average of weekly lead totals: the seasonal curve.
pub fn weekly_curve(days: &[MergedDay]) -> Vec<WeeklyCurvePoint> {
    let mut per_year_week: BTreeMap<(i32, u32), (f64, f64, f64)> = BTreeMap::new();
    for day in days {
        let entry = per_year_week.entry((day.year, day.week_num)).or_default();
        entry.0 += day.total_leads as f64;
        entry.1 += day.organic_leads as f64;
        entry.2 += day.dm_leads as f64;
    }

    let mut per_week: BTreeMap<u32, Vec<(f64, f64, f64)>> = BTreeMap::new();
    for ((_, week), totals) in per_year_week {
        per_week.entry(week).or_default().push(totals);
    }

    per_week
        .into_iter()
        .map(|(week_num, values)| {
            let count = values.len() as f64;
            WeeklyCurvePoint {
                week_num,
                avg_total: values.iter().map(|v| v.0).sum::<f64>() / count,
                avg_organic: values.iter().map(|v| v.1).sum::<f64>() / count,
                avg_dm: values.iter().map(|v| v.2).sum::<f64>() / count,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionImpact {
    pub condition: String,
    pub avg_total: f64,
    pub avg_organic: f64,
    pub median_total: f64,
    pub count: usize,
    /// The weather-condition multiplier, as percent vs the all-days average.
    pub pct_vs_baseline: f64,
}

/// Average leads per coarse weather condition, descending, small buckets
/// omitted.
pub fn condition_impact(days: &[MergedDay], min_samples: usize) -> Vec<ConditionImpact> {
    let overall_avg = metrics::mean(
        &days
            .iter()
            .map(|d| d.total_leads as f64)
            .collect::<Vec<_>>(),
    );

    let mut impacts: Vec<ConditionImpact> = WeatherCondition::all()
        .into_iter()
        .filter_map(|condition| {
            let group: Vec<&MergedDay> = days
                .iter()
                .filter(|day| classify_condition(day) == condition)
                .collect();
            if group.len() < min_samples {
                return None;
            }
            let totals: Vec<f64> = group.iter().map(|d| d.total_leads as f64).collect();
            let avg_total = metrics::mean(&totals);
            Some(ConditionImpact {
                condition: condition.as_str().to_string(),
                avg_total,
                avg_organic: metrics::mean(
                    &group
                        .iter()
                        .map(|d| d.organic_leads as f64)
                        .collect::<Vec<_>>(),
                ),
                median_total: metrics::median(&totals),
                count: group.len(),
                pct_vs_baseline: if overall_avg > 0.0 {
                    (avg_total / overall_avg - 1.0) * 100.0
                } else {
                    0.0
                },
            })
        })
        .collect();
    impacts.sort_by(|a, b| {
        b.avg_total
            .partial_cmp(&a.avg_total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    impacts
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeBucket {
    pub label: String,
    pub avg_total: f64,
    pub avg_organic: f64,
    pub count: usize,
    pub pct_vs_baseline: f64,
}

fn range_buckets<F>(
    days: &[MergedDay],
    bounds: &[(f64, f64, &str)],
    min_samples: usize,
    value_of: F,
) -> Vec<RangeBucket>
where
    F: Fn(&MergedDay) -> Option<f64>,
{
    let overall_avg = metrics::mean(
        &days
            .iter()
            .map(|d| d.total_leads as f64)
            .collect::<Vec<_>>(),
    );
    bounds
        .iter()
        .filter_map(|(low, high, label)| {
            // Left-exclusive, right-inclusive intervals.
            let group: Vec<&MergedDay> = days
                .iter()
                .filter(|day| value_of(day).is_some_and(|v| v > *low && v <= *high))
                .collect();
            if group.len() < min_samples {
                return None;
            }
            let avg_total = metrics::mean(
                &group
                    .iter()
                    .map(|d| d.total_leads as f64)
                    .collect::<Vec<_>>(),
            );
            Some(RangeBucket {
                label: label.to_string(),
                avg_total,
                avg_organic: metrics::mean(
                    &group
                        .iter()
                        .map(|d| d.organic_leads as f64)
                        .collect::<Vec<_>>(),
                ),
                count: group.len(),
                pct_vs_baseline: if overall_avg > 0.0 {
                    (avg_total / overall_avg - 1.0) * 100.0
                } else {
                    0.0
                },
            })
        })
        .collect()
}

pub fn temperature_buckets(days: &[MergedDay], min_samples: usize) -> Vec<RangeBucket> {
    range_buckets(
        days,
        &[
            (0.0, 40.0, "<40F"),
            (40.0, 50.0, "40-50F"),
            (50.0, 60.0, "50-60F"),
            (60.0, 70.0, "60-70F"),
            (70.0, 80.0, "70-80F"),
            (80.0, 100.0, "80+F"),
        ],
        min_samples,
        |day| day.temp_max,
    )
}

pub fn sunshine_buckets(days: &[MergedDay], min_samples: usize) -> Vec<RangeBucket> {
    range_buckets(
        days,
        &[
            (-1.0, 2.0, "<2hrs"),
            (2.0, 5.0, "2-5hrs"),
            (5.0, 8.0, "5-8hrs"),
            (8.0, 15.0, "8+hrs"),
        ],
        min_samples,
        |day| day.sunshine_hrs,
    )
}

pub fn precipitation_buckets(days: &[MergedDay], min_samples: usize) -> Vec<RangeBucket> {
    range_buckets(
        days,
        &[
            (-0.01, 0.0, "Dry"),
            (0.0, 0.1, "Trace"),
            (0.1, 0.5, "Light Rain"),
            (0.5, 5.0, "Heavy Rain"),
        ],
        min_samples,
        |day| day.precip_in,
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTypeConditionCell {
    pub day_type: String,
    pub condition: String,
    pub avg_leads: f64,
    pub count: usize,
}

/// Weekday/Saturday/Sunday x condition cross table.
pub fn day_type_condition_cross(days: &[MergedDay], min_samples: usize) -> Vec<DayTypeConditionCell> {
    let day_type = |day: &MergedDay| -> &'static str {
        if day.dow < 5 {
            "Weekday"
        } else if day.dow == 5 {
            "Saturday"
        } else {
            "Sunday"
        }
    };

    let mut cells = Vec::new();
    for type_name in ["Weekday", "Saturday", "Sunday"] {
        for condition in WeatherCondition::all() {
            let group: Vec<&MergedDay> = days
                .iter()
                .filter(|day| day_type(day) == type_name && classify_condition(day) == condition)
                .collect();
            if group.len() < min_samples {
                continue;
            }
            cells.push(DayTypeConditionCell {
                day_type: type_name.to_string(),
                condition: condition.as_str().to_string(),
                avg_leads: metrics::mean(
                    &group
                        .iter()
                        .map(|d| d.total_leads as f64)
                        .collect::<Vec<_>>(),
                ),
                count: group.len(),
            });
        }
    }
    cells
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DmWeekly {
    pub week_num: u32,
    pub avg_dm: f64,
    pub total_dm: u32,
    pub days: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DmTiming {
    pub days_with_dm: usize,
    pub dm_median_daily: f64,
    /// Days above twice the median DM day, read as mail-drop responses.
    pub spike_days: usize,
    pub spike_avg_temp: Option<f64>,
    pub non_spike_avg_temp: Option<f64>,
    pub spike_avg_sunshine: Option<f64>,
    pub weekly: Vec<DmWeekly>,
}

/// Direct-mail drop timing: when DM responses spike and what the weather
/// looked like on those days. Returns None when too few DM days exist.
pub fn dm_timing(days: &[MergedDay], min_samples: usize) -> Option<DmTiming> {
    let dm_days: Vec<&MergedDay> = days.iter().filter(|day| day.dm_leads > 0).collect();
    if dm_days.len() < min_samples {
        return None;
    }

    let dm_counts: Vec<f64> = dm_days.iter().map(|d| d.dm_leads as f64).collect();
    let dm_median = metrics::median(&dm_counts);
    let spike_threshold = dm_median * 2.0;
    let (spikes, normal): (Vec<&&MergedDay>, Vec<&&MergedDay>) = dm_days
        .iter()
        .partition(|day| (day.dm_leads as f64) > spike_threshold);

    let avg_of = |group: &[&&MergedDay], value: fn(&MergedDay) -> Option<f64>| -> Option<f64> {
        let values: Vec<f64> = group.iter().filter_map(|day| value(day)).collect();
        if values.is_empty() {
            None
        } else {
            Some(metrics::mean(&values))
        }
    };

    let mut weekly_grouped: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for day in &dm_days {
        weekly_grouped
            .entry(day.week_num)
            .or_default()
            .push(day.dm_leads);
    }
    let weekly = weekly_grouped
        .into_iter()
        .map(|(week_num, counts)| DmWeekly {
            week_num,
            avg_dm: counts.iter().map(|c| *c as f64).sum::<f64>() / counts.len() as f64,
            total_dm: counts.iter().sum(),
            days: counts.len(),
        })
        .collect();

    Some(DmTiming {
        days_with_dm: dm_days.len(),
        dm_median_daily: dm_median,
        spike_days: spikes.len(),
        spike_avg_temp: avg_of(&spikes, |d| d.temp_max),
        non_spike_avg_temp: avg_of(&normal, |d| d.temp_max),
        spike_avg_sunshine: avg_of(&spikes, |d| d.sunshine_hrs),
        weekly,
    })
}

/// Season phases for the weather-interaction breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonPhase {
    Early,
    Ramp,
    Peak,
    Tail,
}

impl SeasonPhase {
    pub fn of(day_of_season: i64) -> SeasonPhase {
        if day_of_season < 14 {
            SeasonPhase::Early
        } else if day_of_season < 30 {
            SeasonPhase::Ramp
        } else if day_of_season < 60 {
            SeasonPhase::Peak
        } else {
            SeasonPhase::Tail
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SeasonPhase::Early => "Early (Feb 15-Mar 1)",
            SeasonPhase::Ramp => "Ramp (Mar 1-17)",
            SeasonPhase::Peak => "Peak (Mar 17-Apr 16)",
            SeasonPhase::Tail => "Tail (Apr 16-May 10)",
        }
    }

    pub fn all() -> [SeasonPhase; 4] {
        [
            SeasonPhase::Early,
            SeasonPhase::Ramp,
            SeasonPhase::Peak,
            SeasonPhase::Tail,
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseWeatherEffect {
    pub phase: String,
    pub quality: String,
    pub avg_leads: f64,
    pub phase_avg: f64,
    pub vs_phase_avg_pct: f64,
    pub count: usize,
}

/// How much weather quality moves leads within each season phase, weekdays
/// only.
pub fn phase_weather_effects(days: &[MergedDay], min_samples: usize) -> Vec<PhaseWeatherEffect> {
    let weekdays: Vec<&MergedDay> = days.iter().filter(|day| day.dow < 5).collect();
    let mut effects = Vec::new();
    for phase in SeasonPhase::all() {
        let phase_days: Vec<&MergedDay> = weekdays
            .iter()
            .copied()
            .filter(|day| SeasonPhase::of(day.day_of_season) == phase)
            .collect();
        let phase_avg = metrics::mean(
            &phase_days
                .iter()
                .map(|d| d.total_leads as f64)
                .collect::<Vec<_>>(),
        );
        for quality in WeatherQuality::all() {
            let group: Vec<&MergedDay> = phase_days
                .iter()
                .copied()
                .filter(|day| classify_quality(day) == quality)
                .collect();
            if group.len() < min_samples {
                continue;
            }
            let avg_leads = metrics::mean(
                &group
                    .iter()
                    .map(|d| d.total_leads as f64)
                    .collect::<Vec<_>>(),
            );
            effects.push(PhaseWeatherEffect {
                phase: phase.label().to_string(),
                quality: quality.as_str().to_string(),
                avg_leads,
                phase_avg,
                vs_phase_avg_pct: if phase_avg > 0.0 {
                    (avg_leads / phase_avg - 1.0) * 100.0
                } else {
                    0.0
                },
                count: group.len(),
            });
        }
    }
    effects
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempVsNormalEffect {
    pub phase: String,
    pub category: String,
    pub avg_leads: f64,
    pub vs_phase_avg_pct: f64,
    pub count: usize,
}

const TEMP_NORMAL_BAND_F: f64 = 5.0;

/// Above/below-normal temperature effect per phase, where "normal" is the
/// cross-year mean for that day of season.
pub fn temp_vs_normal_effects(days: &[MergedDay], min_samples: usize) -> Vec<TempVsNormalEffect> {
    let weekdays: Vec<&MergedDay> = days.iter().filter(|day| day.dow < 5).collect();

    let mut by_dos: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for day in &weekdays {
        if let Some(temp) = day.temp_max {
            by_dos.entry(day.day_of_season).or_default().push(temp);
        }
    }
    let normal: BTreeMap<i64, f64> = by_dos
        .into_iter()
        .map(|(dos, temps)| (dos, metrics::mean(&temps)))
        .collect();

    let deviation = |day: &MergedDay| -> Option<f64> {
        Some(day.temp_max? - normal.get(&day.day_of_season)?)
    };

    let mut effects = Vec::new();
    for phase in SeasonPhase::all() {
        let phase_days: Vec<&MergedDay> = weekdays
            .iter()
            .copied()
            .filter(|day| SeasonPhase::of(day.day_of_season) == phase)
            .collect();
        let phase_avg = metrics::mean(
            &phase_days
                .iter()
                .map(|d| d.total_leads as f64)
                .collect::<Vec<_>>(),
        );

        let categories: [(&str, Box<dyn Fn(f64) -> bool>); 3] = [
            ("Above (+5F)", Box::new(|dev| dev > TEMP_NORMAL_BAND_F)),
            (
                "Normal (+/-5F)",
                Box::new(|dev: f64| dev.abs() <= TEMP_NORMAL_BAND_F),
            ),
            ("Below (-5F)", Box::new(|dev| dev < -TEMP_NORMAL_BAND_F)),
        ];
        for (label, matches) in categories {
            let group: Vec<&MergedDay> = phase_days
                .iter()
                .copied()
                .filter(|day| deviation(day).is_some_and(&matches))
                .collect();
            if group.len() < min_samples {
                continue;
            }
            let avg_leads = metrics::mean(
                &group
                    .iter()
                    .map(|d| d.total_leads as f64)
                    .collect::<Vec<_>>(),
            );
            effects.push(TempVsNormalEffect {
                phase: phase.label().to_string(),
                category: label.to_string(),
                avg_leads,
                vs_phase_avg_pct: if phase_avg > 0.0 {
                    (avg_leads / phase_avg - 1.0) * 100.0
                } else {
                    0.0
                },
                count: group.len(),
            });
        }
    }
    effects
}

/// Convenience view of condition impacts used by the summary report.
pub fn quality_impact(days: &[MergedDay], config: &AppConfig) -> Vec<(WeatherQuality, f64, usize)> {
    let overall_avg = metrics::mean(
        &days
            .iter()
            .map(|d| d.total_leads as f64)
            .collect::<Vec<_>>(),
    );
    WeatherQuality::all()
        .into_iter()
        .filter_map(|quality| {
            let group: Vec<f64> = days
                .iter()
                .filter(|day| classify_quality(day) == quality)
                .map(|day| day.total_leads as f64)
                .collect();
            if group.len() < config.min_bucket_samples || overall_avg <= 0.0 {
                return None;
            }
            Some((
                quality,
                (metrics::mean(&group) / overall_avg - 1.0) * 100.0,
                group.len(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyRecord, WeatherRecord};
    use chrono::{Days, NaiveDate};

    fn day(year: i32, offset: u64, total: u32, dm: u32) -> MergedDay {
        let date = NaiveDate::from_ymd_opt(year, 2, 15).unwrap() + Days::new(offset);
        let daily = DailyRecord::new(date, (2, 15), total, dm, total - dm);
        let weather = WeatherRecord {
            date,
            temp_max: Some(55.0),
            sunshine_hrs: Some(6.0),
            precip_in: Some(0.0),
            ..WeatherRecord::default()
        };
        MergedDay::from_parts(&daily, Some(&weather))
    }

    #[test]
    fn yearly_summary_tracks_growth() {
        let mut days: Vec<MergedDay> = (0..10).map(|i| day(2021, i, 10, 2)).collect();
        days.extend((0..10).map(|i| day(2022, i, 15, 3)));
        let summary = yearly_summary(&days);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].total, 100);
        assert_eq!(summary[0].yoy_growth_pct, None);
        assert!((summary[1].yoy_growth_pct.unwrap() - 50.0).abs() < 1e-9);
        assert!((summary[1].dm_pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn dow_multiplier_is_relative_to_weekday_average() {
        // Feb 15 2021 is a Monday: offsets 0-4 weekdays, 5 Saturday.
        let mut days: Vec<MergedDay> = (0..5).map(|i| day(2021, i, 20, 0)).collect();
        days.push(day(2021, 5, 10, 0));
        let stats = dow_stats(&days);
        let saturday = stats.iter().find(|s| s.dow == 5).unwrap();
        assert!((saturday.pct_vs_weekday_avg - -50.0).abs() < 1e-9);
        let monday = stats.iter().find(|s| s.dow == 0).unwrap();
        assert!(monday.pct_vs_weekday_avg.abs() < 1e-9);
    }

    #[test]
    fn small_condition_buckets_are_omitted() {
        let mut days: Vec<MergedDay> = (0..6).map(|i| day(2021, i, 12, 0)).collect();
        // One snowy day only; below the threshold of 3 it must not be reported.
        days[0].snowfall_in = Some(0.5);
        let impacts = condition_impact(&days, 3);
        assert!(impacts.iter().all(|c| c.condition != "Snow"));
        assert!(impacts.iter().any(|c| c.condition == "Partly Cloudy"));
    }

    #[test]
    fn temperature_buckets_are_left_exclusive() {
        let mut days: Vec<MergedDay> = (0..3).map(|i| day(2021, i, 10, 0)).collect();
        for record in &mut days {
            record.temp_max = Some(40.0);
        }
        let buckets = temperature_buckets(&days, 3);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].label, "<40F");
    }

    #[test]
    fn season_phase_boundaries() {
        assert_eq!(SeasonPhase::of(0), SeasonPhase::Early);
        assert_eq!(SeasonPhase::of(13), SeasonPhase::Early);
        assert_eq!(SeasonPhase::of(14), SeasonPhase::Ramp);
        assert_eq!(SeasonPhase::of(29), SeasonPhase::Ramp);
        assert_eq!(SeasonPhase::of(30), SeasonPhase::Peak);
        assert_eq!(SeasonPhase::of(59), SeasonPhase::Peak);
        assert_eq!(SeasonPhase::of(60), SeasonPhase::Tail);
    }

    #[test]
    fn dm_timing_needs_dm_days() {
        let days: Vec<MergedDay> = (0..10).map(|i| day(2021, i, 10, 0)).collect();
        assert!(dm_timing(&days, 3).is_none());

        let days: Vec<MergedDay> = (0..10)
            .map(|i| day(2021, i, 10, if i == 0 { 8 } else { 1 }))
            .collect();
        let timing = dm_timing(&days, 3).unwrap();
        assert_eq!(timing.days_with_dm, 10);
        assert_eq!(timing.spike_days, 1);
    }
}
