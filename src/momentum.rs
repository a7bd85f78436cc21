use crate::classify::classify_quality;
use crate::config::MomentumThresholds;
use crate::models::{MergedDay, MomentumFeatures, WeatherQuality};
use chrono::Days;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Pop-day follow-through groups use a smaller floor than the bucket
/// statistics; sequences are rarer than single days.
const POP_MIN_SAMPLES: usize = 2;

/// Streak accumulator carried through one year's date-ordered scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakState {
    pub nice_streak: u32,
    pub bad_streak: u32,
    pub last_quality: Option<WeatherQuality>,
}

impl StreakState {
    /// Season-start state: no streaks, quality unknown.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Folds one observed day into the state.
    pub fn advance(self, quality: WeatherQuality) -> Self {
        match quality {
            WeatherQuality::Nice => Self {
                nice_streak: self.nice_streak + 1,
                bad_streak: 0,
                last_quality: Some(quality),
            },
            WeatherQuality::Bad => Self {
                nice_streak: 0,
                bad_streak: self.bad_streak + 1,
                last_quality: Some(quality),
            },
            WeatherQuality::Ok => Self {
                nice_streak: 0,
                bad_streak: 0,
                last_quality: Some(quality),
            },
        }
    }
}

/// Attaches momentum features to a date-ascending series. The accumulator is
/// re-initialized at every year boundary; no state crosses seasons.
pub fn attach_momentum(days: &mut [MergedDay]) {
    let mut index = 0;
    while index < days.len() {
        let year = days[index].year;
        let start = index;
        while index < days.len() && days[index].year == year {
            index += 1;
        }
        attach_year(&mut days[start..index]);
    }
}

fn attach_year(days: &mut [MergedDay]) {
    let mut state = StreakState::initial();
    let mut prev2_quality: Option<WeatherQuality> = None;
    let mut prev_temp_max: Option<f64> = None;
    let mut prev_sunshine: Option<f64> = None;

    for day in days.iter_mut() {
        let quality = classify_quality(day);
        let prev_quality = state.last_quality;
        state = state.advance(quality);

        // Delta vs the prior day's observation; no prior observation means no change.
        let temp_change_1d = match day.temp_max {
            Some(current) => current - prev_temp_max.unwrap_or(current),
            None => 0.0,
        };
        let sunshine_change_1d = match day.sunshine_hrs {
            Some(current) => current - prev_sunshine.unwrap_or(current),
            None => 0.0,
        };

        day.momentum = Some(MomentumFeatures {
            quality,
            nice_streak: state.nice_streak,
            bad_streak: state.bad_streak,
            prev_quality,
            prev2_quality,
            temp_change_1d,
            sunshine_change_1d,
            is_pop_day: quality == WeatherQuality::Nice
                && prev_quality == Some(WeatherQuality::Bad),
        });

        prev2_quality = prev_quality;
        prev_temp_max = day.temp_max;
        prev_sunshine = day.sunshine_hrs;
    }
}

/// Lead volume relative to the weekday baseline of the same year + ISO week,
/// removing seasonal shape and year-over-year growth from the momentum
/// comparisons.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekRelative {
    pub week_baseline: f64,
    pub ratio: f64,
    pub vs_baseline_pct: f64,
}

/// Computes the week-relative series, parallel to `days`. Weeks without any
/// weekday rows fall back to the overall mean.
pub fn week_relative(days: &[MergedDay]) -> Vec<WeekRelative> {
    let mut totals: HashMap<(i32, u32), (f64, usize)> = HashMap::new();
    for day in days.iter().filter(|day| day.dow < 5) {
        let entry = totals.entry((day.year, day.week_num)).or_insert((0.0, 0));
        entry.0 += day.total_leads as f64;
        entry.1 += 1;
    }

    let overall_mean = if days.is_empty() {
        0.0
    } else {
        days.iter().map(|day| day.total_leads as f64).sum::<f64>() / days.len() as f64
    };

    days.iter()
        .map(|day| {
            let week_baseline = totals
                .get(&(day.year, day.week_num))
                .map(|(sum, count)| sum / *count as f64)
                .unwrap_or(overall_mean);
            let ratio = if week_baseline > 0.0 {
                day.total_leads as f64 / week_baseline
            } else {
                0.0
            };
            WeekRelative {
                week_baseline,
                ratio,
                vs_baseline_pct: (ratio - 1.0) * 100.0,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionStat {
    pub transition: String,
    pub avg_vs_baseline_pct: f64,
    pub avg_ratio: f64,
    pub count: usize,
}

const TRANSITIONS: [(&str, WeatherQuality, WeatherQuality); 6] = [
    ("bad_to_nice", WeatherQuality::Bad, WeatherQuality::Nice),
    ("nice_to_bad", WeatherQuality::Nice, WeatherQuality::Bad),
    ("nice_to_nice", WeatherQuality::Nice, WeatherQuality::Nice),
    ("bad_to_bad", WeatherQuality::Bad, WeatherQuality::Bad),
    ("ok_to_nice", WeatherQuality::Ok, WeatherQuality::Nice),
    ("nice_to_ok", WeatherQuality::Nice, WeatherQuality::Ok),
];

/// Lead performance by weather transition, weekdays only. Transitions with
/// fewer than `min_samples` observations are omitted.
pub fn transition_stats(
    days: &[MergedDay],
    relative: &[WeekRelative],
    min_samples: usize,
) -> Vec<TransitionStat> {
    let mut stats = Vec::new();
    for (name, from, to) in TRANSITIONS {
        let matching: Vec<&WeekRelative> = days
            .iter()
            .zip(relative)
            .filter(|(day, _)| day.dow < 5)
            .filter(|(day, _)| {
                day.momentum.as_ref().is_some_and(|m| {
                    m.quality == to && m.prev_quality == Some(from)
                })
            })
            .map(|(_, rel)| rel)
            .collect();
        if matching.len() < min_samples {
            continue;
        }
        let count = matching.len();
        stats.push(TransitionStat {
            transition: name.to_string(),
            avg_vs_baseline_pct: matching.iter().map(|r| r.vs_baseline_pct).sum::<f64>()
                / count as f64,
            avg_ratio: matching.iter().map(|r| r.ratio).sum::<f64>() / count as f64,
            count,
        });
    }
    stats
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakBucket {
    /// "1", "2", ... with the top bucket labeled e.g. "5+".
    pub streak: String,
    pub avg_leads: f64,
    pub vs_baseline_pct: f64,
    pub count: usize,
}

fn streak_buckets<F>(
    days: &[MergedDay],
    relative: &[WeekRelative],
    cap: u32,
    min_samples: usize,
    streak_of: F,
) -> Vec<StreakBucket>
where
    F: Fn(&MomentumFeatures) -> u32,
{
    let mut buckets = Vec::new();
    for length in 1..=cap {
        let top = length == cap;
        let matching: Vec<(&MergedDay, &WeekRelative)> = days
            .iter()
            .zip(relative)
            .filter(|(day, _)| day.dow < 5)
            .filter(|(day, _)| {
                day.momentum.as_ref().is_some_and(|m| {
                    let streak = streak_of(m);
                    if top {
                        streak >= length
                    } else {
                        streak == length
                    }
                })
            })
            .collect();
        if matching.len() < min_samples {
            continue;
        }
        let count = matching.len();
        buckets.push(StreakBucket {
            streak: if top {
                format!("{length}+")
            } else {
                length.to_string()
            },
            avg_leads: matching
                .iter()
                .map(|(day, _)| day.total_leads as f64)
                .sum::<f64>()
                / count as f64,
            vs_baseline_pct: matching
                .iter()
                .map(|(_, rel)| rel.vs_baseline_pct)
                .sum::<f64>()
                / count as f64,
            count,
        });
    }
    buckets
}

/// Lead impact by consecutive-nice-day streak length, weekdays only.
pub fn nice_streak_buckets(
    days: &[MergedDay],
    relative: &[WeekRelative],
    thresholds: &MomentumThresholds,
    min_samples: usize,
) -> Vec<StreakBucket> {
    streak_buckets(
        days,
        relative,
        thresholds.nice_streak_cap,
        min_samples,
        |m| m.nice_streak,
    )
}

pub fn bad_streak_buckets(
    days: &[MergedDay],
    relative: &[WeekRelative],
    thresholds: &MomentumThresholds,
    min_samples: usize,
) -> Vec<StreakBucket> {
    streak_buckets(
        days,
        relative,
        thresholds.bad_streak_cap,
        min_samples,
        |m| m.bad_streak,
    )
}

/// Streak-length lead multipliers vs the weekday average, for downstream
/// forecast adjustment. Keyed "0".."4"/"5+" etc.; streak 0 is the baseline
/// bucket.
pub fn streak_multipliers(
    days: &[MergedDay],
    thresholds: &MomentumThresholds,
    min_samples: usize,
) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    let weekdays: Vec<&MergedDay> = days.iter().filter(|day| day.dow < 5).collect();
    let weekday_mean = if weekdays.is_empty() {
        0.0
    } else {
        weekdays
            .iter()
            .map(|day| day.total_leads as f64)
            .sum::<f64>()
            / weekdays.len() as f64
    };

    let collect = |cap: u32, streak_of: &dyn Fn(&MomentumFeatures) -> u32| {
        let mut multipliers = BTreeMap::new();
        if weekday_mean <= 0.0 {
            return multipliers;
        }
        for length in 0..=cap {
            let top = length == cap;
            let matching: Vec<&&MergedDay> = weekdays
                .iter()
                .filter(|day| {
                    day.momentum.as_ref().is_some_and(|m| {
                        let streak = streak_of(m);
                        if top {
                            streak >= length
                        } else {
                            streak == length
                        }
                    })
                })
                .collect();
            if matching.len() < min_samples {
                continue;
            }
            let avg = matching
                .iter()
                .map(|day| day.total_leads as f64)
                .sum::<f64>()
                / matching.len() as f64;
            let label = if top {
                format!("{length}+")
            } else {
                length.to_string()
            };
            multipliers.insert(label, avg / weekday_mean);
        }
        multipliers
    };

    (
        collect(thresholds.nice_streak_cap, &|m| m.nice_streak),
        collect(thresholds.bad_streak_cap, &|m| m.bad_streak),
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopFollowGroup {
    pub next_quality: String,
    pub avg_ratio: f64,
    pub count: usize,
    /// Ratio held at or above `pop_hold_ratio` of the pop-day average.
    pub held: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowThroughPath {
    pub day0_ratio: f64,
    pub day1_ratio: f64,
    pub day2_ratio: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PopAnalysis {
    pub pop_day_count: usize,
    pub pop_avg_ratio: f64,
    pub next_day: Vec<PopFollowGroup>,
    /// Nice weather continues after the pop.
    pub sustained: Option<FollowThroughPath>,
    /// Weather turns bad after the pop.
    pub regressed: Option<FollowThroughPath>,
}

struct PopSequence {
    pop_ratio: f64,
    follow: [Option<(WeatherQuality, f64)>; 3],
}

/// One-day-pop follow-through: after a nice day that breaks a bad spell, does
/// the lift hold? Weekdays only; weekend gaps leave follow-up slots empty.
pub fn pop_analysis(
    days: &[MergedDay],
    relative: &[WeekRelative],
    thresholds: &MomentumThresholds,
) -> PopAnalysis {
    let weekdays: Vec<(&MergedDay, &WeekRelative)> = days
        .iter()
        .zip(relative)
        .filter(|(day, _)| day.dow < 5)
        .collect();
    let by_date: HashMap<chrono::NaiveDate, (&MergedDay, &WeekRelative)> = weekdays
        .iter()
        .map(|(day, rel)| (day.date, (*day, *rel)))
        .collect();

    let mut sequences = Vec::new();
    for (day, rel) in &weekdays {
        if !day.momentum.as_ref().is_some_and(|m| m.is_pop_day) {
            continue;
        }
        let mut follow = [None, None, None];
        for (slot, offset) in (1u64..=3).enumerate() {
            if let Some(next_date) = day.date.checked_add_days(Days::new(offset)) {
                if let Some((next_day, next_rel)) = by_date.get(&next_date) {
                    let quality = next_day.momentum.as_ref().map(|m| m.quality);
                    follow[slot] = quality.map(|q| (q, next_rel.ratio));
                }
            }
        }
        sequences.push(PopSequence {
            pop_ratio: rel.ratio,
            follow,
        });
    }

    if sequences.len() < POP_MIN_SAMPLES {
        return PopAnalysis::default();
    }

    let pop_avg_ratio =
        sequences.iter().map(|s| s.pop_ratio).sum::<f64>() / sequences.len() as f64;
    let hold_floor = pop_avg_ratio * thresholds.pop_hold_ratio;

    let mut next_day = Vec::new();
    for quality in WeatherQuality::all() {
        let ratios: Vec<f64> = sequences
            .iter()
            .filter_map(|s| match s.follow[0] {
                Some((q, ratio)) if q == quality => Some(ratio),
                _ => None,
            })
            .collect();
        if ratios.len() < POP_MIN_SAMPLES {
            continue;
        }
        let avg_ratio = ratios.iter().sum::<f64>() / ratios.len() as f64;
        next_day.push(PopFollowGroup {
            next_quality: quality.as_str().to_string(),
            avg_ratio,
            count: ratios.len(),
            held: avg_ratio >= hold_floor,
        });
    }

    let path = |sequences: Vec<&PopSequence>| -> Option<FollowThroughPath> {
        if sequences.len() < POP_MIN_SAMPLES {
            return None;
        }
        let mean =
            |values: Vec<f64>| -> f64 { values.iter().sum::<f64>() / values.len().max(1) as f64 };
        Some(FollowThroughPath {
            day0_ratio: mean(sequences.iter().map(|s| s.pop_ratio).collect()),
            day1_ratio: mean(
                sequences
                    .iter()
                    .filter_map(|s| s.follow[0].map(|(_, r)| r))
                    .collect(),
            ),
            day2_ratio: mean(
                sequences
                    .iter()
                    .filter_map(|s| s.follow[1].map(|(_, r)| r))
                    .collect(),
            ),
            count: sequences.len(),
        })
    };

    let sustained = path(
        sequences
            .iter()
            .filter(|s| {
                matches!(s.follow[0], Some((WeatherQuality::Nice, _)))
                    && matches!(
                        s.follow[1],
                        Some((WeatherQuality::Nice, _)) | Some((WeatherQuality::Ok, _))
                    )
            })
            .collect(),
    );
    let regressed = path(
        sequences
            .iter()
            .filter(|s| {
                matches!(s.follow[0], Some((WeatherQuality::Bad, _)))
                    || (matches!(s.follow[0], Some((WeatherQuality::Ok, _)))
                        && matches!(s.follow[1], Some((WeatherQuality::Bad, _))))
            })
            .collect(),
    );

    PopAnalysis {
        pop_day_count: sequences.len(),
        pop_avg_ratio,
        next_day,
        sustained,
        regressed,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaturdayContext {
    /// "0".."4", top bucket "5+".
    pub nice_weekdays_prior: String,
    pub avg_saturday_leads: f64,
    pub count: usize,
}

/// Saturday volume bucketed by how many of the preceding Mon-Fri days were
/// nice.
pub fn saturday_momentum(days: &[MergedDay]) -> Vec<SaturdayContext> {
    let mut counts: Vec<(u32, f64)> = Vec::new();
    for saturday in days.iter().filter(|day| day.dow == 5) {
        let nice_prior = days
            .iter()
            .filter(|day| {
                day.dow < 5
                    && day.date < saturday.date
                    && saturday.date - day.date <= chrono::Duration::days(5)
            })
            .filter(|day| {
                day.momentum
                    .as_ref()
                    .is_some_and(|m| m.quality == WeatherQuality::Nice)
            })
            .count() as u32;
        counts.push((nice_prior, saturday.total_leads as f64));
    }

    let mut buckets = Vec::new();
    for n in 0..=5u32 {
        let top = n == 5;
        let matching: Vec<f64> = counts
            .iter()
            .filter(|(prior, _)| if top { *prior >= n } else { *prior == n })
            .map(|(_, leads)| *leads)
            .collect();
        if matching.len() < POP_MIN_SAMPLES {
            continue;
        }
        buckets.push(SaturdayContext {
            nice_weekdays_prior: if top { format!("{n}+") } else { n.to_string() },
            avg_saturday_leads: matching.iter().sum::<f64>() / matching.len() as f64,
            count: matching.len(),
        });
    }
    buckets
}
