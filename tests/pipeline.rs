use chrono::{Days, NaiveDate};
use leadcast::commands::{momentum as momentum_cmd, scenarios, train, validate};
use leadcast::config::{AppConfig, GbdtParams};
use leadcast::models::{DailyRecord, MergedDay, WeatherRecord};
use leadcast::{features, ingest, momentum, series};
use std::fs;
use std::io::Write;
use std::path::Path;

const SEASON_DAYS: u64 = 80;

fn test_params() -> GbdtParams {
    GbdtParams {
        n_trees: 40,
        ..GbdtParams::default()
    }
}

/// Deterministic synthetic season: warming trend with a weekly weather cycle,
/// lead volume driven by day of week, sunshine and temperature.
fn synthetic_season(year: i32) -> Vec<MergedDay> {
    let start = NaiveDate::from_ymd_opt(year, 2, 15).unwrap();
    (0..SEASON_DAYS)
        .map(|offset| {
            let date = start + Days::new(offset);
            let temp = 36.0 + offset as f64 * 0.35 + ((offset * 7) % 13) as f64;
            let sunshine = ((offset * 5) % 12) as f64;
            let precip = if offset % 9 == 0 { 0.4 } else { 0.0 };
            let snowfall = if offset < 6 && offset % 3 == 0 { 0.5 } else { 0.0 };

            let daily_probe = DailyRecord::new(date, (2, 15), 0, 0, 0);
            let dow_factor = if daily_probe.dow == 6 {
                0.4
            } else if daily_probe.dow == 5 {
                0.7
            } else {
                1.0
            };
            let weather_lift = sunshine * 1.5 + (temp - 40.0) * 0.3 - precip * 20.0;
            let growth = (year - 2021) as f64 * 4.0;
            let total = ((18.0 + weather_lift.max(0.0) + growth) * dow_factor).round() as u32;
            let dm = total / 5;

            let daily = DailyRecord::new(date, (2, 15), total, dm, total - dm);
            let weather = WeatherRecord {
                date,
                temp_max: Some(temp),
                temp_min: Some(temp - 14.0),
                temp_mean: Some(temp - 7.0),
                precip_in: Some(precip),
                snowfall_in: Some(snowfall),
                snow_depth: Some(if snowfall > 0.0 { 1.2 } else { 0.0 }),
                sunshine_hrs: Some(sunshine),
                rain_in: Some(precip),
                wind_max_mph: Some(8.0 + (offset % 11) as f64),
                solar_radiation: Some(sunshine * 1.9),
            };
            MergedDay::from_parts(&daily, Some(&weather))
        })
        .collect()
}

fn seeded_config(output_dir: &Path) -> AppConfig {
    AppConfig {
        output_dir: output_dir.to_path_buf(),
        ..AppConfig::default()
    }
}

fn write_test_artifact(config: &AppConfig) {
    let mut days = Vec::new();
    for year in 2021..=2025 {
        days.extend(synthetic_season(year));
    }
    // Partial in-progress season.
    days.extend(synthetic_season(2026).into_iter().take(12));
    series::write_artifact(&series::artifact_path(config), &days).unwrap();
}

#[test]
fn artifact_driven_commands_produce_reports() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_config(dir.path());
    write_test_artifact(&config);

    train::run(&config, test_params()).unwrap();
    validate::run(&config, test_params()).unwrap();
    momentum_cmd::run(&config, test_params()).unwrap();
    scenarios::run(&config, test_params()).unwrap();

    for filename in [
        "feature_importance.csv",
        "organic_feature_importance.csv",
        "training_summary.json",
        "validation_results.json",
        "momentum_analysis.json",
        "momentum_coefficients.json",
        "weather_uplift_scenarios.csv",
        "seasonal_projection.csv",
        "weekly_projection.csv",
    ] {
        assert!(
            config.output_dir.join(filename).exists(),
            "missing report {filename}"
        );
    }

    let training: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join("training_summary.json")).unwrap())
            .unwrap();
    assert_eq!(training["hyperparameters"]["nTrees"], 40);
    assert_eq!(training["targets"].as_array().unwrap().len(), 2);

    let validation: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join("validation_results.json")).unwrap())
            .unwrap();
    assert_eq!(validation["holdoutTest"]["testYear"], 2025);
    assert_eq!(
        validation["holdoutTest"]["byDow"].as_array().unwrap().len(),
        7
    );
    // The in-progress season was present in the artifact and must be scored.
    assert_eq!(validation["partialSeasonCheck"]["year"], 2026);

    // Importance shares are normalized.
    let mut reader =
        csv::Reader::from_path(config.output_dir.join("feature_importance.csv")).unwrap();
    let mut total_importance = 0.0;
    for row in reader.records() {
        let row = row.unwrap();
        total_importance += row[1].parse::<f64>().unwrap();
    }
    assert!((total_importance - 1.0).abs() < 1e-6);
}

#[test]
fn holdout_metrics_ignore_partial_season_presence() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_config(dir.path());

    let mut without_partial = Vec::new();
    for year in 2021..=2025 {
        without_partial.extend(synthetic_season(year));
    }
    let mut with_partial = without_partial.clone();
    with_partial.extend(synthetic_season(2026).into_iter().take(15));

    features::engineer(&mut without_partial, config.trend_base_year);
    features::engineer(&mut with_partial, config.trend_base_year);

    let a = leadcast::trainer::holdout_validation(&without_partial, &config, test_params()).unwrap();
    let b = leadcast::trainer::holdout_validation(&with_partial, &config, test_params()).unwrap();
    assert_eq!(a.metrics.mae, b.metrics.mae);
    assert_eq!(a.metrics.r2, b.metrics.r2);
    assert_eq!(a.total_predicted, b.total_predicted);
}

#[test]
fn artifact_round_trip_preserves_streak_and_rolling_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let config = seeded_config(dir.path());
    write_test_artifact(&config);

    let mut days = series::read_artifact(&series::artifact_path(&config)).unwrap();
    features::engineer(&mut days, config.trend_base_year);
    momentum::attach_momentum(&mut days);

    let mut seen_years = Vec::new();
    for (index, day) in days.iter().enumerate() {
        let momentum = day.momentum.as_ref().unwrap();
        let derived = day.derived.as_ref().unwrap();
        if !seen_years.contains(&day.year) {
            seen_years.push(day.year);
            // First day of each season: window of one, no carried streaks.
            assert_eq!(derived.temp_max_3d_avg, day.temp_max);
            assert!(momentum.nice_streak <= 1);
            assert!(momentum.bad_streak <= 1);
            assert_eq!(momentum.prev_quality, None);
            assert_eq!(momentum.temp_change_1d, 0.0);
        } else {
            let prev = days[index - 1].momentum.as_ref().unwrap();
            match momentum.quality {
                leadcast::models::WeatherQuality::Nice => {
                    assert_eq!(momentum.nice_streak, prev.nice_streak + 1)
                }
                _ => assert_eq!(momentum.nice_streak, 0),
            }
        }
    }
    assert_eq!(seen_years.len(), 6);
}

fn write_lead_csv(path: &Path, rows: &[(&str, &str)]) {
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "EstimateRequestedDate,ProgramSourceDescription").unwrap();
    for (date, source) in rows {
        writeln!(file, "{date},{source}").unwrap();
    }
}

#[test]
fn ingestion_aggregates_season_leads_and_skips_missing_years() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        data_dir: dir.path().to_path_buf(),
        output_dir: dir.path().join("output"),
        ..AppConfig::default()
    };

    write_lead_csv(
        &dir.path().join("2024 Leads.csv"),
        &[
            ("3/4/2024", "DM Spring Postcard"),
            ("3/4/2024", "Google Ads"),
            ("2024-03-05", "Website"),
            // Outside the season window, must be filtered.
            ("7/4/2024", "Google Ads"),
            // Unparseable date, must be dropped.
            ("soon", "Google Ads"),
        ],
    );
    // The 2025 export carries the stray space in its filename.
    write_lead_csv(
        &dir.path().join("2025 Leads .csv"),
        &[("2/20/2025", "Direct Mail - Neighborhood")],
    );

    let daily = ingest::load_daily_leads(&config).unwrap();
    assert_eq!(daily.len(), 3);

    let march_4 = &daily[0];
    assert_eq!(march_4.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert_eq!(march_4.total_leads, 2);
    assert_eq!(march_4.dm_leads, 1);
    assert_eq!(march_4.organic_leads, 1);

    let feb_20 = &daily[2];
    assert_eq!(feb_20.year, 2025);
    assert_eq!(feb_20.dm_leads, 1);
    assert_eq!(feb_20.day_of_season, 5);
}
