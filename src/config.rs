use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::path::PathBuf;

/// Gradient boosting hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct GbdtParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled per tree.
    pub subsample: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            max_depth: 4,
            learning_rate: 0.05,
            subsample: 0.8,
            min_samples_leaf: 10,
            seed: 42,
        }
    }
}

impl GbdtParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(anyhow!("n_trees must be >= 1"));
        }
        if self.max_depth == 0 {
            return Err(anyhow!("max_depth must be >= 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(anyhow!(
                "learning_rate must be a positive number (value: {})",
                self.learning_rate
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(anyhow!(
                "subsample must be in (0, 1] (value: {})",
                self.subsample
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(anyhow!("min_samples_leaf must be >= 1"));
        }
        Ok(())
    }
}

/// Follow-through thresholds for the pop-day analysis. These are working
/// heuristics awaiting domain review, so they live in configuration rather
/// than as literals in the analysis code.
#[derive(Debug, Clone, Copy)]
pub struct MomentumThresholds {
    /// A follow-up day at or above this ratio of the pop-day ratio counts as "held".
    pub pop_hold_ratio: f64,
    /// Nice streak lengths at or above this value are reported as one top bucket.
    pub nice_streak_cap: u32,
    /// Bad streak lengths at or above this value are reported as one top bucket.
    pub bad_streak_cap: u32,
}

impl Default for MomentumThresholds {
    fn default() -> Self {
        Self {
            pop_hold_ratio: 0.9,
            nice_streak_cap: 5,
            bad_streak_cap: 4,
        }
    }
}

/// All knobs for one analysis run, built once in `main` and passed into each
/// pipeline stage.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Reference market coordinates for the weather archive.
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    /// Season window as (month, day) bounds, inclusive.
    pub season_start: (u32, u32),
    pub season_end: (u32, u32),
    /// Years with a complete season of data; drives aggregate statistics and training.
    pub full_years: Vec<i32>,
    /// Holdout split: train on these years, score the test year blind.
    pub holdout_train_years: Vec<i32>,
    pub holdout_test_year: i32,
    /// Season currently in progress, scored as an out-of-sample check only.
    pub partial_year: i32,
    /// Anchor for the linear year trend feature (earliest season = 0).
    pub trend_base_year: i32,
    /// Bucketed statistics over fewer observations than this are omitted.
    pub min_bucket_samples: usize,
    pub momentum: MomentumThresholds,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            latitude: 39.9566,
            longitude: -75.6058,
            timezone: "America/New_York".to_string(),
            season_start: (2, 15),
            season_end: (5, 10),
            full_years: vec![2021, 2022, 2023, 2024, 2025],
            holdout_train_years: vec![2021, 2022, 2023, 2024],
            holdout_test_year: 2025,
            partial_year: 2026,
            trend_base_year: 2021,
            min_bucket_samples: 3,
            momentum: MomentumThresholds::default(),
            data_dir: PathBuf::from("."),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.full_years.is_empty() {
            return Err(anyhow!("full_years must name at least one season"));
        }
        if self.holdout_train_years.is_empty() {
            return Err(anyhow!("holdout_train_years must name at least one season"));
        }
        if self.holdout_train_years.contains(&self.holdout_test_year) {
            return Err(anyhow!(
                "holdout test year {} must not appear in the training years",
                self.holdout_test_year
            ));
        }
        for &(month, day) in [&self.season_start, &self.season_end] {
            if NaiveDate::from_ymd_opt(2021, month, day).is_none() {
                return Err(anyhow!("invalid season bound {:02}-{:02}", month, day));
            }
        }
        if !(self.momentum.pop_hold_ratio > 0.0 && self.momentum.pop_hold_ratio <= 1.0) {
            return Err(anyhow!(
                "pop_hold_ratio must be in (0, 1] (value: {})",
                self.momentum.pop_hold_ratio
            ));
        }
        Ok(())
    }

    pub fn season_start_date(&self, year: i32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.season_start.0, self.season_start.1)
            .ok_or_else(|| anyhow!("invalid season start for year {}", year))
    }

    pub fn season_end_date(&self, year: i32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.season_end.0, self.season_end.1)
            .ok_or_else(|| anyhow!("invalid season end for year {}", year))
    }

    /// True when the date falls inside the Feb 15 - May 10 window of its year.
    pub fn in_season(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        let md = date.month() * 100 + date.day();
        let lo = self.season_start.0 * 100 + self.season_start.1;
        let hi = self.season_end.0 * 100 + self.season_end.1;
        md >= lo && md <= hi
    }

    /// Year trend value for the projection grid: the most recent full season.
    pub fn latest_trend(&self) -> f64 {
        let latest = self.full_years.iter().copied().max().unwrap_or(self.trend_base_year);
        (latest - self.trend_base_year) as f64
    }
}
