use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calrecur_core::{Event, ExceptionIndex, ics};
use chrono_tz::Tz;

/// An `.ics` file split into series/singular events and their exceptions.
pub struct CalendarFile {
    path: PathBuf,
    pub events: Vec<Event>,
    pub exceptions: ExceptionIndex,
}

impl CalendarFile {
    pub fn open(path: &Path, zone: Tz) -> Result<Self> {
        let events = ics::import_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let (events, exceptions) = ExceptionIndex::partition(zone, events);

        Ok(CalendarFile {
            path: path.to_path_buf(),
            events,
            exceptions,
        })
    }

    /// Position of the event to operate on: the one with `uid`, or the
    /// first recurring event in the file.
    pub fn select(&self, uid: Option<&str>) -> Result<usize> {
        match uid {
            Some(uid) => self.events.iter().position(|e| e.uid == uid).ok_or_else(|| {
                let available: Vec<_> = self.events.iter().map(|e| e.uid.as_str()).collect();
                anyhow::anyhow!("Event '{}' not found. Available: {}", uid, available.join(", "))
            }),
            None => self.events.iter().position(Event::recurs).ok_or_else(|| {
                anyhow::anyhow!(
                    "No recurring events in {}. Use --uid to pick an event.",
                    self.path.display()
                )
            }),
        }
    }

    /// Write all events back, each series followed by its exceptions.
    pub fn save(&self) -> Result<()> {
        let mut all = Vec::with_capacity(self.events.len() + self.exceptions.len());
        for event in &self.events {
            all.push(event.clone());
            all.extend(self.exceptions.for_series(&event.uid).into_iter().cloned());
        }
        // Exceptions whose series is not in this file
        all.extend(
            self.exceptions
                .iter()
                .filter(|e| !self.events.iter().any(|m| m.uid == e.uid))
                .cloned(),
        );

        ics::export_file(&self.path, &all).with_context(|| format!("Failed to write {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), events = all.len(), "saved calendar file");
        Ok(())
    }
}
