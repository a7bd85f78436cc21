use crate::config::AppConfig;
use crate::models::DailyRecord;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no lead files could be read from {}", .0.display())]
    NoLeadData(PathBuf),
    #[error("no lead rows fell inside the season window")]
    EmptySeason,
}

/// How a raw lead source string maps onto reporting segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    DirectMail,
    OrganicDigital,
}

/// One raw row of a lead export. Export column names vary only in whitespace,
/// which the reader trims.
#[derive(Debug, Deserialize)]
struct RawLeadRow {
    #[serde(rename = "EstimateRequestedDate")]
    requested_date: String,
    #[serde(rename = "ProgramSourceDescription", default)]
    source: Option<String>,
}

/// Classifies a free-text program source into Direct Mail vs Organic/Digital.
pub fn classify_source(source: &str) -> SourceType {
    let upper = source.trim().to_uppercase();
    if upper.starts_with("DM") || upper.contains("DIRECT MAIL") {
        SourceType::DirectMail
    } else {
        SourceType::OrganicDigital
    }
}

const LEAD_DATE_FORMATS: [&str; 4] = ["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y %H:%M"];

fn parse_lead_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in LEAD_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
        if let Ok(datetime) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Export filenames as they arrive from the CRM, quirks included.
fn lead_file_candidates(year: i32) -> [String; 3] {
    [
        format!("{year} Leads.csv"),
        format!("{year} Leads .csv"),
        format!("{year} Estimate Requests so far.csv"),
    ]
}

#[derive(Debug, Clone, Copy)]
struct ParsedLead {
    date: NaiveDate,
    source_type: SourceType,
}

fn read_lead_file(path: &Path) -> Result<Vec<ParsedLead>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut leads = Vec::new();
    let mut dropped = 0usize;
    for row in reader.deserialize::<RawLeadRow>() {
        let row = row.with_context(|| format!("malformed row in {}", path.display()))?;
        let Some(date) = parse_lead_date(&row.requested_date) else {
            dropped += 1;
            continue;
        };
        let source_type = classify_source(row.source.as_deref().unwrap_or("Unknown"));
        leads.push(ParsedLead { date, source_type });
    }
    if dropped > 0 {
        warn!(
            "Dropped {} row(s) with unparseable dates from {}",
            dropped,
            path.display()
        );
    }
    Ok(leads)
}

/// Loads every available year of lead exports, filters to the season window
/// and collapses the rows to one `DailyRecord` per calendar day, date
/// ascending. A missing year is skipped with a warning; having no readable
/// year at all is fatal.
pub fn load_daily_leads(config: &AppConfig) -> Result<Vec<DailyRecord>> {
    let mut all_leads: Vec<ParsedLead> = Vec::new();
    let mut years_loaded = 0usize;

    let mut years: Vec<i32> = config.full_years.clone();
    years.push(config.partial_year);
    for year in years {
        let Some(path) = lead_file_candidates(year)
            .into_iter()
            .map(|name| config.data_dir.join(name))
            .find(|candidate| candidate.exists())
        else {
            warn!("No lead file found for {year}; skipping that season");
            continue;
        };
        let leads = read_lead_file(&path)?;
        info!("Loaded {} raw leads from {}", leads.len(), path.display());
        years_loaded += 1;
        all_leads.extend(leads);
    }

    if years_loaded == 0 {
        return Err(IngestError::NoLeadData(config.data_dir.clone()).into());
    }

    let season_leads: Vec<ParsedLead> = all_leads
        .into_iter()
        .filter(|lead| config.in_season(lead.date))
        .collect();
    if season_leads.is_empty() {
        return Err(IngestError::EmptySeason.into());
    }

    Ok(aggregate_daily(config, &season_leads))
}

fn aggregate_daily(config: &AppConfig, leads: &[ParsedLead]) -> Vec<DailyRecord> {
    let mut per_day: BTreeMap<NaiveDate, (u32, u32, u32)> = BTreeMap::new();
    for lead in leads {
        let entry = per_day.entry(lead.date).or_insert((0, 0, 0));
        entry.0 += 1;
        match lead.source_type {
            SourceType::DirectMail => entry.1 += 1,
            SourceType::OrganicDigital => entry.2 += 1,
        }
    }

    per_day
        .into_iter()
        .map(|(date, (total, dm, organic))| {
            DailyRecord::new(date, config.season_start, total, dm, organic)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_classification() {
        assert_eq!(classify_source("DM Spring 2024"), SourceType::DirectMail);
        assert_eq!(classify_source("dm postcard"), SourceType::DirectMail);
        assert_eq!(
            classify_source("Mailer - Direct Mail"),
            SourceType::DirectMail
        );
        assert_eq!(classify_source("Google Ads"), SourceType::OrganicDigital);
        assert_eq!(classify_source("Unknown"), SourceType::OrganicDigital);
    }

    #[test]
    fn mixed_date_formats_parse() {
        assert_eq!(
            parse_lead_date("3/17/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 17)
        );
        assert_eq!(
            parse_lead_date("2024-03-17"),
            NaiveDate::from_ymd_opt(2024, 3, 17)
        );
        assert_eq!(parse_lead_date("not a date"), None);
        assert_eq!(parse_lead_date(""), None);
    }

    #[test]
    fn aggregation_sums_by_source_in_date_order() {
        let config = AppConfig::default();
        let date_a = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let date_b = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let leads = vec![
            ParsedLead {
                date: date_a,
                source_type: SourceType::DirectMail,
            },
            ParsedLead {
                date: date_a,
                source_type: SourceType::OrganicDigital,
            },
            ParsedLead {
                date: date_b,
                source_type: SourceType::OrganicDigital,
            },
        ];
        let daily = aggregate_daily(&config, &leads);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, date_b);
        assert_eq!(daily[0].total_leads, 1);
        assert_eq!(daily[1].total_leads, 2);
        assert_eq!(daily[1].dm_leads, 1);
        assert_eq!(daily[1].organic_leads, 1);
    }
}
