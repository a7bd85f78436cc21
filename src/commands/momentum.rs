use crate::config::{AppConfig, GbdtParams};
use crate::models::MergedDay;
use crate::trainer::compare_feature_sets;
use crate::{features, momentum, report, series};
use anyhow::Result;
use log::info;
use serde_json::json;

/// Streak, transition and pop-day analyses plus the baseline-vs-momentum
/// model comparison. Sundays are excluded for a cleaner signal.
pub fn run(config: &AppConfig, params: GbdtParams) -> Result<()> {
    let merged = series::read_artifact(&series::artifact_path(config))?;
    let mut days: Vec<MergedDay> = series::filter_years(&merged, &config.full_years)
        .into_iter()
        .filter(|day| day.dow < 6)
        .collect();
    days.sort_by_key(|day| day.date);
    features::engineer(&mut days, config.trend_base_year);
    momentum::attach_momentum(&mut days);
    info!("Loaded {} Mon-Sat days across {} seasons", days.len(), config.full_years.len());

    let relative = momentum::week_relative(&days);
    let transitions = momentum::transition_stats(&days, &relative, config.min_bucket_samples);
    for stat in &transitions {
        info!(
            "  {:<14} {:+6.1}% vs baseline ({:.2}x, n={})",
            stat.transition, stat.avg_vs_baseline_pct, stat.avg_ratio, stat.count
        );
    }

    let nice_streaks =
        momentum::nice_streak_buckets(&days, &relative, &config.momentum, config.min_bucket_samples);
    let bad_streaks =
        momentum::bad_streak_buckets(&days, &relative, &config.momentum, config.min_bucket_samples);
    let pops = momentum::pop_analysis(&days, &relative, &config.momentum);
    info!(
        "Pop days: {} at {:.2}x their week baseline",
        pops.pop_day_count, pops.pop_avg_ratio
    );
    let saturdays = momentum::saturday_momentum(&days);

    let comparison = compare_feature_sets(&days, params)?;
    info!(
        "Model comparison: CV MAE {:.2} -> {:.2}, R2 {:.3} -> {:.3}, momentum importance {:.1}%",
        comparison.baseline_cv_mae,
        comparison.momentum_cv_mae,
        comparison.baseline_r2,
        comparison.momentum_r2,
        comparison.momentum_importance_pct
    );

    report::write_json(
        config,
        "momentum_analysis.json",
        &json!({
            "transitions": transitions,
            "niceStreaks": nice_streaks,
            "badStreaks": bad_streaks,
            "popAnalysis": pops,
            "saturdayContext": saturdays,
            "modelComparison": comparison,
        }),
    )?;

    let (nice_multipliers, bad_multipliers) =
        momentum::streak_multipliers(&days, &config.momentum, config.min_bucket_samples);
    report::write_json(
        config,
        "momentum_coefficients.json",
        &json!({
            "niceStreakMultipliers": nice_multipliers,
            "badStreakMultipliers": bad_multipliers,
            "note": "Apply on top of the base forecast. Streak 0 is the no-streak baseline; values are ratios vs the weekday average.",
        }),
    )?;
    Ok(())
}
