use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use calrecur_core::Expander;
use calrecur_core::recurrence::start_of_day;
use chrono::{Duration, Utc};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::render::{Render, date_label};
use crate::when::parse_date;

/// Days shown when `--to` is not given
const DEFAULT_DAYS: i64 = 7;

pub fn run(path: &Path, from: Option<&str>, to: Option<&str>, json: bool, expander: &Expander) -> Result<()> {
    let zone = expander.zone();
    let today = Utc::now().with_timezone(&zone).date_naive();

    let from_date = from.map(parse_date).transpose()?.unwrap_or(today);
    let to_date = to
        .map(parse_date)
        .transpose()?
        .unwrap_or(from_date + Duration::days(DEFAULT_DAYS - 1));
    if to_date < from_date {
        anyhow::bail!("--to ({}) is before --from ({})", to_date, from_date);
    }

    let file = CalendarFile::open(path, zone)?;
    let range_start = start_of_day(from_date, zone);
    let range_end = start_of_day(to_date + Duration::days(1), zone) - Duration::seconds(1);

    let occurrences = expander.occurrences_between(&file.events, &file.exceptions, &range_start, &range_end);
    let days = expander.daily_buckets(&occurrences, from_date, to_date);

    if json {
        let output = serde_json::json!({
            "occurrences": occurrences,
            "days": days,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if days.is_empty() {
        println!("{}", "No occurrences found".dimmed());
        return Ok(());
    }

    let by_id: HashMap<String, _> = occurrences.iter().map(|o| (o.instance_id(), o)).collect();
    let summaries: HashMap<&str, &str> = file
        .events
        .iter()
        .map(|e| (e.uid.as_str(), e.summary.as_str()))
        .collect();

    for (i, (date, ids)) in days.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", date_label(*date, today).bold());
        for id in ids {
            let Some(occurrence) = by_id.get(id) else {
                continue;
            };
            let summary = summaries.get(occurrence.event_uid.as_str()).copied().unwrap_or_default();
            println!("  {} {}", occurrence.render(), summary.dimmed());
        }
    }

    Ok(())
}
