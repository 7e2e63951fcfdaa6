use std::path::Path;

use anyhow::Result;
use calrecur_core::{Expander, delete_series};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::render::pluralize;

/// Remove a series and every exception of it.
pub fn run(path: &Path, uid: &str, expander: &Expander) -> Result<()> {
    let mut file = CalendarFile::open(path, expander.zone())?;
    let index = file.select(Some(uid))?;

    let removed = delete_series(&mut file.exceptions, uid);
    let master = file.events.remove(index);
    file.save()?;

    let count = removed.len();
    println!(
        "{}",
        format!("  Deleted: {} and {} {}", master.summary, count, pluralize("exception", count)).red()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calrecur_core::{Settings, ics};

    #[test]
    fn removes_master_and_exceptions() {
        let calendar = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:standup\r\n\
SUMMARY:Standup\r\n\
DTSTART:20240101T090000Z\r\n\
DTEND:20240101T091500Z\r\n\
RRULE:FREQ=DAILY\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:standup\r\n\
SUMMARY:Standup (moved)\r\n\
RECURRENCE-ID:20240102T090000Z\r\n\
DTSTART:20240102T100000Z\r\n\
DTEND:20240102T101500Z\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:lunch\r\n\
SUMMARY:Lunch\r\n\
DTSTART:20240105T110000Z\r\n\
DTEND:20240105T120000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.ics");
        std::fs::write(&path, calendar).unwrap();
        let settings = Settings {
            time_zone: Some("UTC".into()),
            ..Settings::default()
        };

        run(&path, "standup", &Expander::from_settings(&settings).unwrap()).unwrap();

        let events = ics::import_file(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid, "lunch");
    }
}
