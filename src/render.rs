//! Colored terminal rendering for calrecur-core types.

use calrecur_core::{Occurrence, RecurrenceCategory, WeekdaySet};
use chrono::NaiveDate;
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Occurrence {
    fn render(&self) -> String {
        let time = if self.all_day {
            "all-day".to_string()
        } else {
            format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
        };
        let marker = if self.detached { " (moved)" } else { "" };

        format!("{:>11} {}{}", time, self.instance_id(), marker.yellow())
    }
}

/// Category with its weekdays when they matter, e.g. `weekly-by-days (MO,WE)`.
pub fn render_category(category: RecurrenceCategory, days: WeekdaySet) -> String {
    match category {
        RecurrenceCategory::WeeklyByDays => format!("{} ({})", category.cyan(), days),
        RecurrenceCategory::Custom => category.yellow().to_string(),
        _ => category.cyan().to_string(),
    }
}

/// A date as a human-readable label ("Today", "Tomorrow", "Wed Feb 25").
pub fn date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d %Y").to_string(),
    }
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 { word.to_string() } else { format!("{}s", word) }
}
