use std::path::Path;

use anyhow::Result;
use calrecur_core::{Expander, Locator};
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::commands::resolve_when;
use crate::render::{Render, date_label};

pub fn run(path: &Path, uid: Option<&str>, at: Option<&str>, json: bool, expander: &Expander) -> Result<()> {
    let zone = expander.zone();
    let file = CalendarFile::open(path, zone)?;
    let event = &file.events[file.select(uid)?];
    let target = resolve_when(at, zone)?;

    let locator = Locator::new(expander, &file.exceptions);
    let occurrence = locator.locate(event, Some(&target));

    if json {
        println!("{}", serde_json::to_string_pretty(&occurrence)?);
        return Ok(());
    }

    match occurrence {
        Some(occurrence) => {
            let today = Utc::now().with_timezone(&zone).date_naive();
            println!("{} {}", event.summary.bold(), date_label(occurrence.start.date_naive(), today));
            println!("{}", occurrence.render());
        }
        None => println!("{}", format!("No occurrence of '{}' found", event.summary).dimmed()),
    }

    Ok(())
}
