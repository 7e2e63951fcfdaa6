//! Event types.
//!
//! An [`Event`] is either a singular occurrence, the master of a recurring
//! series, or a detached exception instance (it carries a `recurrence_id`).

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::rule::Recurrence;
use crate::time::{local_to_instant, zone_named};

/// A calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub status: EventStatus,

    /// RRULE/RDATE/EXDATE data for master events
    pub recurrence: Option<Recurrence>,
    /// Original start of the occurrence this instance replaces (RECURRENCE-ID)
    pub recurrence_id: Option<EventTime>,

    pub reminder: Option<Reminder>,
    /// Revision sequence number (SEQUENCE)
    pub sequence: Option<i64>,
    /// X- properties, preserved for round-tripping
    pub custom_properties: Vec<(String, String)>,
}

impl Event {
    pub fn new(uid: impl Into<String>, summary: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Event {
            uid: uid.into(),
            summary: summary.into(),
            description: None,
            location: None,
            start,
            end,
            status: EventStatus::Confirmed,
            recurrence: None,
            recurrence_id: None,
            reminder: None,
            sequence: None,
            custom_properties: Vec::new(),
        }
    }

    /// True when the event has at least one RRULE or RDATE.
    pub fn recurs(&self) -> bool {
        self.recurrence.as_ref().is_some_and(Recurrence::recurs)
    }

    /// True for detached exception instances.
    pub fn is_exception(&self) -> bool {
        self.recurrence_id.is_some()
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Fixed duration of every occurrence: whole days for all-day events,
    /// elapsed time otherwise.
    pub fn duration(&self, zone: Tz) -> Duration {
        if self.is_all_day() {
            Duration::days((self.end.date() - self.start.date()).num_days())
        } else {
            self.end.resolve(zone) - self.start.resolve(zone)
        }
    }

    /// End of an occurrence starting at `start`.
    pub fn end_for(&self, start: &DateTime<Tz>, zone: Tz) -> DateTime<Tz> {
        if self.is_all_day() {
            let days = (self.end.date() - self.start.date()).num_days();
            let end_date = start.date_naive() + Duration::days(days);
            local_to_instant(end_date.and_time(NaiveTime::MIN), zone)
        } else {
            *start + self.duration(zone)
        }
    }

    pub(crate) fn bump_sequence(&mut self) {
        self.sequence = Some(self.sequence.unwrap_or(0) + 1);
    }
}

/// A reminder: either an offset before the start, or a fixed time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reminder {
    /// Seconds before the start; zero means "at start".
    Before { seconds: i64 },
    At(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Start/end/recurrence-id value, keeping the time frame it was written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day (floating date)
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    /// Wall clock time interpreted in the viewer's zone
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Calendar date in the value's own frame.
    pub fn date(&self) -> NaiveDate {
        self.naive().date()
    }

    /// Wall clock value in the value's own frame (midnight for dates).
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN),
            EventTime::DateTimeUtc(dt) => dt.naive_utc(),
            EventTime::DateTimeFloating(dt) => *dt,
            EventTime::DateTimeZoned { datetime, .. } => *datetime,
        }
    }

    /// The instant this value denotes, expressed in `zone`.
    ///
    /// Dates and floating times are wall clock values in `zone`. An unknown
    /// TZID is interpreted in `zone` as well.
    pub fn resolve(&self, zone: Tz) -> DateTime<Tz> {
        match self {
            EventTime::Date(_) | EventTime::DateTimeFloating(_) => local_to_instant(self.naive(), zone),
            EventTime::DateTimeUtc(dt) => dt.with_timezone(&zone),
            EventTime::DateTimeZoned { datetime, tzid } => match zone_named(tzid) {
                Some(tz) => local_to_instant(*datetime, tz).with_timezone(&zone),
                None => {
                    tracing::warn!(tzid = %tzid, fallback = %zone, "unknown time zone, using canonical zone");
                    local_to_instant(*datetime, zone)
                }
            },
        }
    }

    /// Express `instant` in the same variant (and zone) as `template`.
    pub fn like(template: &EventTime, instant: &DateTime<Tz>) -> EventTime {
        match template {
            EventTime::Date(_) => EventTime::Date(instant.date_naive()),
            EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(instant.with_timezone(&Utc)),
            EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(instant.naive_local()),
            EventTime::DateTimeZoned { tzid, .. } => {
                let datetime = match zone_named(tzid) {
                    Some(tz) => instant.with_timezone(&tz).naive_local(),
                    None => instant.naive_local(),
                };
                EventTime::DateTimeZoned {
                    datetime,
                    tzid: tzid.clone(),
                }
            }
        }
    }

    /// Shift by a duration, keeping the variant.
    #[must_use]
    pub fn shifted(&self, by: Duration) -> EventTime {
        match self {
            EventTime::Date(d) => EventTime::Date(*d + Duration::days(by.num_days())),
            EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(*dt + by),
            EventTime::DateTimeFloating(dt) => EventTime::DateTimeFloating(*dt + by),
            EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
                datetime: *datetime + by,
                tzid: tzid.clone(),
            },
        }
    }

    /// ICS value form (without parameters).
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, .. } => datetime.format("%Y%m%dT%H%M%S").to_string(),
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%d %H:%M"), tzid)
            }
        }
    }
}

/// Recurrence-id string: ISO 8601 with the UTC offset spelled out
/// (`Z` for UTC).
pub fn recurrence_id_string<Z: TimeZone>(instant: &DateTime<Z>) -> String
where
    Z::Offset: fmt::Display,
{
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn floating_resolves_as_wall_clock_in_zone() {
        let t = EventTime::DateTimeFloating(ymd_hm(2024, 1, 8, 10, 0));
        let resolved = t.resolve(chrono_tz::Europe::Helsinki);
        assert_eq!(resolved.naive_local(), ymd_hm(2024, 1, 8, 10, 0));
        assert_eq!(resolved.with_timezone(&Utc).naive_utc(), ymd_hm(2024, 1, 8, 8, 0));
    }

    #[test]
    fn zoned_converts_into_canonical_zone() {
        let t = EventTime::DateTimeZoned {
            datetime: ymd_hm(2024, 1, 8, 10, 0),
            tzid: "America/New_York".to_string(),
        };
        let resolved = t.resolve(chrono_tz::UTC);
        assert_eq!(resolved.naive_local(), ymd_hm(2024, 1, 8, 15, 0));
    }

    #[test]
    fn unknown_tzid_falls_back_to_canonical_zone() {
        let t = EventTime::DateTimeZoned {
            datetime: ymd_hm(2024, 1, 8, 10, 0),
            tzid: "Mars/Olympus_Mons".to_string(),
        };
        let resolved = t.resolve(chrono_tz::Europe::Helsinki);
        assert_eq!(resolved.naive_local(), ymd_hm(2024, 1, 8, 10, 0));
    }

    #[test]
    fn like_keeps_template_variant() {
        let instant = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 8, 15, 0, 0).unwrap())
            .resolve(chrono_tz::UTC);
        let zoned_template = EventTime::DateTimeZoned {
            datetime: ymd_hm(2024, 1, 1, 10, 0),
            tzid: "America/New_York".to_string(),
        };
        assert_eq!(
            EventTime::like(&zoned_template, &instant),
            EventTime::DateTimeZoned {
                datetime: ymd_hm(2024, 1, 8, 10, 0),
                tzid: "America/New_York".to_string(),
            }
        );

        let date_template = EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(
            EventTime::like(&date_template, &instant),
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap())
        );
    }

    #[test]
    fn all_day_duration_counts_days() {
        let event = Event::new(
            "a",
            "Holiday",
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 3, 30).unwrap()),
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()),
        );
        assert_eq!(event.duration(chrono_tz::UTC), Duration::days(2));

        // DST starts in Helsinki on 2024-03-31; the end is still midnight.
        let zone = chrono_tz::Europe::Helsinki;
        let start = event.start.resolve(zone);
        let end = event.end_for(&start, zone);
        assert_eq!(end.naive_local(), ymd_hm(2024, 4, 1, 0, 0));
    }

    #[test]
    fn recurrence_id_string_spells_out_offset() {
        let zone = chrono_tz::Europe::Helsinki;
        let instant = EventTime::DateTimeFloating(ymd_hm(2024, 1, 8, 10, 0)).resolve(zone);
        assert_eq!(recurrence_id_string(&instant), "2024-01-08T10:00:00+02:00");

        let utc = Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap();
        assert_eq!(recurrence_id_string(&utc), "2024-01-08T10:00:00Z");
    }

    #[test]
    fn display_forms() {
        assert_eq!(
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()).to_string(),
            "2024-01-08"
        );
        assert_eq!(
            EventTime::DateTimeFloating(ymd_hm(2024, 1, 8, 10, 0)).to_ics_string(),
            "20240108T100000"
        );
    }
}
