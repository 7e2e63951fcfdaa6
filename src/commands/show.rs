use std::path::Path;

use anyhow::Result;
use calrecur_core::{EventModification, Expander, Locator, recurrence_id_string};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::render::{pluralize, render_category};

pub fn run(path: &Path, expander: &Expander) -> Result<()> {
    let file = CalendarFile::open(path, expander.zone())?;
    let locator = Locator::new(expander, &file.exceptions);

    let series: Vec<_> = file.events.iter().filter(|e| e.recurs()).collect();
    if series.is_empty() {
        println!("{}", "No recurring events found".dimmed());
        return Ok(());
    }

    for (i, event) in series.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        let modification = EventModification::new(event.clone(), expander);

        println!("{} {}", event.summary.bold(), event.uid.dimmed());
        println!("  starts:  {}", event.start);
        println!(
            "  repeats: {}",
            render_category(modification.category(), modification.weekly_days())
        );
        match modification.end_date() {
            Some(date) => println!("  until:   {}", date),
            None => println!("  until:   {}", "forever".dimmed()),
        }

        let exceptions = file.exceptions.for_series(&event.uid).len();
        if exceptions > 0 {
            println!("  {} {}", exceptions, pluralize("exception", exceptions));
        }

        let stranded = locator.stranded(event);
        if !stranded.is_empty() {
            let ids: Vec<String> = stranded
                .iter()
                .filter_map(|e| e.recurrence_id.as_ref())
                .map(|rid| recurrence_id_string(&rid.resolve(expander.zone())))
                .collect();
            println!(
                "  {}",
                format!("{} no longer in the series: {}", pluralize("exception", ids.len()), ids.join(", ")).yellow()
            );
        }
    }

    Ok(())
}
