//! Edit buffer for an event.
//!
//! [`EventModification`] holds a working copy of an event together with the
//! recurrence values an editor shows (category, weekly days, end date).
//! Nothing touches the original event until [`EventModification::save`] or
//! [`EventModification::replace_occurrence`] hands back the result.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::category::{self, RecurrenceCategory};
use crate::error::{CoreError, CoreResult};
use crate::event::{recurrence_id_string, Event, EventTime, Reminder};
use crate::exception::detach;
use crate::locate::Occurrence;
use crate::recurrence::Expander;
use crate::time::zone_named;
use crate::weekday::WeekdaySet;

/// How a wall clock time passed to a time setter should be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSpec {
    Utc,
    Floating,
    /// IANA zone name
    Zone(String),
}

/// Identifies the exception created by [`EventModification::replace_occurrence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeInformation {
    pub uid: String,
    pub recurrence_id: String,
}

#[derive(Debug, Clone)]
pub struct EventModification {
    event: Event,
    category: RecurrenceCategory,
    weekly_days: WeekdaySet,
    end_date: Option<NaiveDate>,
    end_changed: bool,
    times_changed: bool,
}

impl EventModification {
    pub fn new(event: Event, expander: &Expander) -> Self {
        let category = category::classify(event.recurrence.as_ref(), &event.start);
        let weekly_days = category::weekly_days(event.recurrence.as_ref());
        let end_date = expander.end_date(&event).unwrap_or_else(|e| {
            tracing::warn!(uid = %event.uid, error = %e, "could not determine recurrence end");
            None
        });
        EventModification {
            event,
            category,
            weekly_days,
            end_date,
            end_changed: false,
            times_changed: false,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn category(&self) -> RecurrenceCategory {
        self.category
    }

    pub fn weekly_days(&self) -> WeekdaySet {
        self.weekly_days
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn reminder(&self) -> Option<&Reminder> {
        self.event.reminder.as_ref()
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) -> bool {
        replace(&mut self.event.summary, summary.into())
    }

    pub fn set_description(&mut self, description: Option<String>) -> bool {
        replace(&mut self.event.description, description)
    }

    pub fn set_location(&mut self, location: Option<String>) -> bool {
        replace(&mut self.event.location, location)
    }

    pub fn set_category(&mut self, category: RecurrenceCategory) -> bool {
        replace(&mut self.category, category)
    }

    pub fn set_weekly_days(&mut self, days: WeekdaySet) -> bool {
        replace(&mut self.weekly_days, days)
    }

    pub fn set_end_date(&mut self, end_date: Option<NaiveDate>) -> bool {
        let changed = replace(&mut self.end_date, end_date);
        self.end_changed |= changed;
        changed
    }

    pub fn set_reminder(&mut self, reminder: Option<Reminder>) -> bool {
        replace(&mut self.event.reminder, reminder)
    }

    pub fn set_start_time(&mut self, datetime: NaiveDateTime, spec: TimeSpec) -> bool {
        let value = with_spec(&self.event.start, datetime, &spec);
        let changed = replace(&mut self.event.start, value);
        self.times_changed |= changed;
        changed
    }

    pub fn set_end_time(&mut self, datetime: NaiveDateTime, spec: TimeSpec) -> bool {
        let value = with_spec(&self.event.end, datetime, &spec);
        let changed = replace(&mut self.event.end, value);
        self.times_changed |= changed;
        changed
    }

    /// Switch between all-day dates and floating times, keeping the days
    /// the event covers.
    pub fn set_all_day(&mut self, all_day: bool) -> bool {
        if self.event.is_all_day() == all_day {
            return false;
        }
        let start = self.event.start.date();
        if all_day {
            let end = &self.event.end;
            let mut last = end.date();
            if end.naive().time() != NaiveTime::MIN || last <= start {
                last += Duration::days(1);
            }
            self.event.start = EventTime::Date(start);
            self.event.end = EventTime::Date(last.max(start + Duration::days(1)));
        } else {
            let end = self.event.end.date().max(start);
            self.event.start = EventTime::DateTimeFloating(start.and_time(NaiveTime::MIN));
            self.event.end = EventTime::DateTimeFloating(end.and_time(NaiveTime::MIN));
        }
        self.times_changed = true;
        true
    }

    /// Apply the recurrence values and return the edited event.
    ///
    /// A custom rule whose end date was not edited is kept as it is, so a
    /// COUNT stays a COUNT.
    pub fn save(self) -> Event {
        let mut event = self.event;
        if self.category == RecurrenceCategory::Custom && !self.end_changed {
            return event;
        }
        category::apply(
            &mut event.recurrence,
            self.category,
            self.weekly_days,
            self.end_date,
            &event.start,
        );
        event
    }

    /// Turn the edits into an exception for one occurrence of `master`.
    ///
    /// The occurrence is detached from `master` and the returned instance
    /// carries this buffer's summary, description, location and reminder.
    /// Edited times replace the occurrence's times; untouched ones keep
    /// them.
    pub fn replace_occurrence(
        self,
        expander: &Expander,
        master: &mut Event,
        occurrence: &Occurrence,
    ) -> CoreResult<(Event, ChangeInformation)> {
        let slot = occurrence
            .recurrence_id
            .ok_or_else(|| CoreError::NotRecurring(occurrence.event_uid.clone()))?;
        let mut instance = detach(expander, master, &slot)?;

        instance.summary = self.event.summary;
        instance.description = self.event.description;
        instance.location = self.event.location;
        instance.reminder = self.event.reminder;
        if self.times_changed {
            instance.start = self.event.start;
            instance.end = self.event.end;
        }

        let info = ChangeInformation {
            uid: instance.uid.clone(),
            recurrence_id: recurrence_id_string(&slot),
        };
        Ok((instance, info))
    }
}

fn replace<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

/// Build a time value from a wall clock time and spec. An unknown zone name
/// keeps the frame `previous` was in.
fn with_spec(previous: &EventTime, datetime: NaiveDateTime, spec: &TimeSpec) -> EventTime {
    match spec {
        TimeSpec::Utc => EventTime::DateTimeUtc(Utc.from_utc_datetime(&datetime)),
        TimeSpec::Floating => EventTime::DateTimeFloating(datetime),
        TimeSpec::Zone(name) if zone_named(name).is_some() => EventTime::DateTimeZoned {
            datetime,
            tzid: name.clone(),
        },
        TimeSpec::Zone(name) => {
            tracing::warn!(zone = %name, "cannot find time zone, keeping previous one");
            match previous {
                EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(Utc.from_utc_datetime(&datetime)),
                EventTime::DateTimeZoned { tzid, .. } => EventTime::DateTimeZoned {
                    datetime,
                    tzid: tzid.clone(),
                },
                EventTime::Date(_) | EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(datetime),
            }
        }
    }
}
