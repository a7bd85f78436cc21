use crate::analysis::{DowStats, YearlySummary};
use crate::config::AppConfig;
use crate::metrics::RegressionMetrics;
use crate::models::{MergedDay, WeatherQuality};
use crate::trainer::CrossValidation;
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

/// Writes one report object as pretty-printed JSON under the output
/// directory.
pub fn write_json<T: Serialize>(config: &AppConfig, filename: &str, value: &T) -> Result<()> {
    let path = config.output_dir.join(filename);
    ensure_parent(&path)?;
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Writes a table of rows as CSV under the output directory.
pub fn write_csv<T: Serialize>(config: &AppConfig, filename: &str, rows: &[T]) -> Result<()> {
    let path = config.output_dir.join(filename);
    ensure_parent(&path)?;
    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("failed to write a row to {}", path.display()))?;
    }
    writer.flush()?;
    info!("Table written to {}", path.display());
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportanceRow {
    pub feature: String,
    pub importance: f64,
}

/// Importance table rows for one fitted model, descending.
pub fn importance_rows(model: &crate::gbdt::GbdtModel) -> Vec<FeatureImportanceRow> {
    model
        .feature_importance()
        .into_iter()
        .map(|(feature, importance)| FeatureImportanceRow {
            feature,
            importance,
        })
        .collect()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// The run-level summary consumed by the dashboard: data coverage, the
/// headline day-of-week and weather multipliers, and model accuracy.
pub fn build_summary(
    config: &AppConfig,
    days: &[MergedDay],
    yearly: &[YearlySummary],
    dow: &[DowStats],
    quality_impacts: &[(WeatherQuality, f64, usize)],
    cv: &CrossValidation,
    in_sample: &RegressionMetrics,
) -> serde_json::Value {
    let total_leads: u32 = days.iter().map(|day| day.total_leads).sum();
    let weekday: Vec<f64> = days
        .iter()
        .filter(|day| day.dow < 5)
        .map(|day| day.total_leads as f64)
        .collect();
    let saturday: Vec<f64> = days
        .iter()
        .filter(|day| day.dow == 5)
        .map(|day| day.total_leads as f64)
        .collect();
    let weekday_avg = crate::metrics::mean(&weekday);
    let saturday_avg = crate::metrics::mean(&saturday);

    let best_dow = dow
        .iter()
        .max_by(|a, b| {
            a.avg_total
                .partial_cmp(&b.avg_total)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|stats| stats.dow_name.clone());

    let weather_impact: serde_json::Map<String, serde_json::Value> = quality_impacts
        .iter()
        .map(|(quality, pct, count)| {
            (
                format!("{}VsBaselinePct", quality.as_str()),
                json!({ "pct": pct, "days": count }),
            )
        })
        .collect();

    json!({
        "title": "Seasonal Lead Forecast - Run Summary",
        "dataCoverage": {
            "years": config.full_years,
            "seasonWindow": format!(
                "{:02}-{:02} to {:02}-{:02}",
                config.season_start.0, config.season_start.1,
                config.season_end.0, config.season_end.1
            ),
            "totalLeadsAnalyzed": total_leads,
            "totalDaysAnalyzed": days.len(),
            "weatherLocation": format!("{:.4}, {:.4}", config.latitude, config.longitude),
        },
        "keyFindings": {
            "yearOverYear": yearly,
            "dayOfWeek": {
                "weekdayAvg": weekday_avg,
                "saturdayAvg": saturday_avg,
                "saturdayDiscountPct": if weekday_avg > 0.0 {
                    (1.0 - saturday_avg / weekday_avg) * 100.0
                } else {
                    0.0
                },
                "bestWeekday": best_dow,
            },
            "weatherImpact": weather_impact,
        },
        "modelPerformance": {
            "algorithm": "Gradient Boosted Regression",
            "crossValMae": cv.mean_mae,
            "crossValMaeStd": cv.std_mae,
            "rSquared": in_sample.r2,
            "mape": in_sample.mape,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;
    use crate::models::DailyRecord;
    use chrono::{Days, NaiveDate};

    #[test]
    fn summary_carries_headline_numbers() {
        let config = AppConfig::default();
        // Feb 15 2021 is a Monday; six days cover Mon-Sat.
        let days: Vec<MergedDay> = (0..6)
            .map(|offset| {
                let date = NaiveDate::from_ymd_opt(2021, 2, 15).unwrap() + Days::new(offset);
                let daily = DailyRecord::new(date, (2, 15), 20, 5, 15);
                MergedDay::from_parts(&daily, None)
            })
            .collect();
        let yearly = analysis::yearly_summary(&days);
        let dow = analysis::dow_stats(&days);
        let cv = CrossValidation {
            fold_maes: vec![3.0, 4.0],
            mean_mae: 3.5,
            std_mae: 0.5,
        };
        let in_sample = RegressionMetrics {
            mae: 2.0,
            rmse: 3.0,
            r2: 0.8,
            mape: 12.0,
        };
        let summary = build_summary(&config, &days, &yearly, &dow, &[], &cv, &in_sample);
        assert_eq!(summary["dataCoverage"]["totalLeadsAnalyzed"], 120);
        assert_eq!(summary["modelPerformance"]["crossValMae"], 3.5);
        assert!(summary["keyFindings"]["dayOfWeek"]["weekdayAvg"]
            .as_f64()
            .is_some());
    }

    #[test]
    fn writers_create_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            output_dir: dir.path().join("nested").join("output"),
            ..AppConfig::default()
        };
        write_json(&config, "check.json", &json!({"ok": true})).unwrap();
        #[derive(Serialize)]
        struct Row {
            a: u32,
        }
        write_csv(&config, "check.csv", &[Row { a: 1 }, Row { a: 2 }]).unwrap();
        assert!(config.output_dir.join("check.json").exists());
        assert!(config.output_dir.join("check.csv").exists());
    }
}
