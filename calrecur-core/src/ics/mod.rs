//! ICS import and export.
//!
//! Reads and writes the recurrence-relevant parts of VEVENTs according to
//! RFC 5545: RRULE, RDATE, EXDATE and RECURRENCE-ID, plus the basic event
//! fields and a single reminder.

mod generate;
mod parse;

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::event::Event;

pub use generate::generate_ics;
pub use parse::{parse_event, parse_events};

/// Read every event from an `.ics` file.
pub fn import_file(path: &Path) -> CoreResult<Vec<Event>> {
    let is_ics = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ics"));
    if !is_ics {
        return Err(CoreError::UnsupportedFormat(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let events = parse_events(&content)?;
    tracing::debug!(path = %path.display(), events = events.len(), "imported calendar file");
    Ok(events)
}

/// Write `events` to `path` as one calendar.
pub fn export_file(path: &Path, events: &[Event]) -> CoreResult<()> {
    let content = generate_ics(events)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEKLY: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:weekly-1\r\n\
SUMMARY:Weekly\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
RRULE:FREQ=WEEKLY\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn import_reads_ics_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.ics");
        std::fs::write(&path, WEEKLY).unwrap();

        let events = import_file(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].recurs());
    }

    #[test]
    fn import_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.vcs");
        std::fs::write(&path, WEEKLY).unwrap();

        assert!(matches!(
            import_file(&path),
            Err(CoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ics");
        let events = parse_events(WEEKLY).unwrap();

        export_file(&path, &events).unwrap();
        let reread = import_file(&path).unwrap();
        assert_eq!(reread[0].recurrence, events[0].recurrence);
        assert_eq!(reread[0].start, events[0].start);
    }
}
