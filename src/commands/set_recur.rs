use std::path::Path;

use anyhow::{Context, Result};
use calrecur_core::{EventModification, Expander, RecurrenceCategory, WeekdaySet};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::render::render_category;
use crate::when::parse_date;

pub struct RecurOptions<'a> {
    pub uid: Option<&'a str>,
    pub days: Option<&'a str>,
    pub until: Option<&'a str>,
    pub forever: bool,
}

pub fn run(path: &Path, category: RecurrenceCategory, options: RecurOptions<'_>, expander: &Expander) -> Result<()> {
    let mut file = CalendarFile::open(path, expander.zone())?;
    let index = file.select(options.uid)?;

    let mut modification = EventModification::new(file.events[index].clone(), expander);
    modification.set_category(category);

    if let Some(days) = options.days {
        let days: WeekdaySet = days
            .parse()
            .with_context(|| format!("Invalid weekday list: \"{}\"", days))?;
        modification.set_weekly_days(days);
    }
    if let Some(until) = options.until {
        modification.set_end_date(Some(parse_date(until)?));
    } else if options.forever {
        modification.set_end_date(None);
    }

    if category == RecurrenceCategory::Custom {
        println!("{}", "  Custom rules keep their pattern, only the end is updated".dimmed());
    }

    let days = modification.weekly_days();
    let event = modification.save();
    println!(
        "{}",
        format!("  Updated: {} now repeats {}", event.summary, render_category(category, days)).green()
    );

    file.events[index] = event;
    file.save()
}
