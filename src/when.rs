//! Parsing of user supplied times ("tomorrow 3pm", "2024-01-08 10:00")
//! and durations ("90min").

use anyhow::{Context, Result};
use calrecur_core::EventTime;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date/time given on the command line.
///
/// ISO-like forms are read exactly: an RFC 3339 timestamp gives a UTC
/// time, a bare date an all-day date, anything else a floating time.
/// Otherwise the input goes through natural language parsing; if it has
/// no time tokens (am/pm, HH:MM, noon, midnight, "at") it is a date.
pub fn parse_datetime(input: &str) -> Result<EventTime> {
    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(EventTime::DateTimeUtc(dt.to_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(EventTime::Date(date));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(EventTime::DateTimeFloating(dt));
        }
    }

    let expanded = expand_abbreviations(trimmed);
    let dt = fuzzydate::parse(&expanded).map_err(|_| anyhow::anyhow!("Could not parse date/time: \"{}\"", input))?;

    if has_time_component(trimmed) {
        Ok(EventTime::DateTimeFloating(dt))
    } else {
        Ok(EventTime::Date(dt.date()))
    }
}

/// Parse a calendar date (`--from`, `--until`).
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    Ok(parse_datetime(input)?.date())
}

/// Parse a duration like "1h", "90min" or "2 days".
pub fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration =
        humantime::parse_duration(input.trim()).with_context(|| format!("Could not parse duration: \"{}\"", input))?;
    Duration::from_std(std_duration).context("Duration out of range")
}

const WEEKDAYS: [&str; 7] = ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];

/// Spell out weekday abbreviations ("fri", "thurs") for fuzzydate.
fn expand_abbreviations(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            WEEKDAYS
                .iter()
                .find(|day| word.len() >= 3 && day.starts_with(word))
                .map_or(word, |day| *day)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the input names a time of day: "noon", "15:00", "6pm",
/// "6 pm" or "at 6".
fn has_time_component(input: &str) -> bool {
    let lower = input.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let ends_in_digit = |word: &str| word.ends_with(|c: char| c.is_ascii_digit());
    let starts_with_digit = |word: &str| word.starts_with(|c: char| c.is_ascii_digit());

    words.iter().enumerate().any(|(i, word)| match *word {
        "noon" | "midnight" => true,
        "am" | "pm" => i > 0 && ends_in_digit(words[i - 1]),
        "at" => words.get(i + 1).copied().is_some_and(starts_with_digit),
        _ => is_clock_time(word),
    })
}

fn is_clock_time(word: &str) -> bool {
    if let Some(hour) = word.strip_suffix("am").or_else(|| word.strip_suffix("pm")) {
        return !hour.is_empty() && hour.chars().all(|c| c.is_ascii_digit() || c == ':');
    }
    word.split_once(':')
        .is_some_and(|(h, m)| h.ends_with(|c: char| c.is_ascii_digit()) && m.starts_with(|c: char| c.is_ascii_digit()))
}
