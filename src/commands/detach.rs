use std::path::Path;

use anyhow::Result;
use calrecur_core::{EventModification, EventTime, Expander, Locator, TimeSpec, recurrence_id_string};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::commands::resolve_when;
use crate::when::{parse_datetime, parse_duration};

pub struct DetachOptions<'a> {
    pub at: &'a str,
    pub uid: Option<&'a str>,
    pub start: Option<&'a str>,
    pub duration: Option<&'a str>,
}

/// Split the occurrence at `--at` off its series, optionally moving it.
pub fn run(path: &Path, options: DetachOptions<'_>, expander: &Expander) -> Result<()> {
    let zone = expander.zone();
    let mut file = CalendarFile::open(path, zone)?;
    let index = file.select(options.uid)?;
    let at = resolve_when(Some(options.at), zone)?;

    let occurrence = {
        let locator = Locator::new(expander, &file.exceptions);
        locator
            .locate(&file.events[index], Some(&at))
            .filter(|o| o.recurrence_id == Some(at))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "'{}' has no occurrence at {}",
                    file.events[index].summary,
                    recurrence_id_string(&at)
                )
            })?
    };

    let mut master = file.events[index].clone();
    let mut modification = EventModification::new(master.clone(), expander);

    let start = match options.start {
        Some(input) => parse_datetime(input)?.resolve(zone),
        None => occurrence.start,
    };
    let duration = match options.duration {
        Some(input) => parse_duration(input)?,
        None => occurrence.duration(),
    };
    if options.start.is_some() || options.duration.is_some() {
        let (start_naive, spec) = in_frame_of(&master.start, &start);
        let (end_naive, _) = in_frame_of(&master.end, &(start + duration));
        modification.set_start_time(start_naive, spec.clone());
        modification.set_end_time(end_naive, spec);
    }

    let (instance, info) = modification.replace_occurrence(expander, &mut master, &occurrence)?;
    file.exceptions.insert(instance)?;
    file.events[index] = master;
    file.save()?;

    println!(
        "{}",
        format!("  Detached: {} ({})", info.uid, info.recurrence_id).green()
    );
    Ok(())
}

/// Wall clock time and time spec expressing `instant` the way `template`
/// is expressed.
fn in_frame_of(template: &EventTime, instant: &DateTime<Tz>) -> (NaiveDateTime, TimeSpec) {
    let value = match template {
        // A moved all-day occurrence becomes a timed one
        EventTime::Date(_) => EventTime::DateTimeFloating(instant.naive_local()),
        _ => EventTime::like(template, instant),
    };
    let spec = match &value {
        EventTime::DateTimeUtc(_) => TimeSpec::Utc,
        EventTime::DateTimeZoned { tzid, .. } => TimeSpec::Zone(tzid.clone()),
        EventTime::Date(_) | EventTime::DateTimeFloating(_) => TimeSpec::Floating,
    };
    (value.naive(), spec)
}
