//! ICS parsing using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventStatus, EventTime, Reminder};
use crate::rule::{Recurrence, RecurrenceRule};

/// Parse every VEVENT in `content`.
///
/// VEVENTs without a UID or a usable DTSTART are skipped. A malformed RRULE
/// fails the whole parse.
pub fn parse_events(content: &str) -> CoreResult<Vec<Event>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| CoreError::IcsParse(e.to_string()))?;

    let mut events = Vec::new();
    for vevent in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        if let Some(event) = parse_vevent(vevent)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Parse the first VEVENT in `content`.
pub fn parse_event(content: &str) -> Option<Event> {
    parse_events(content).ok()?.into_iter().next()
}

fn parse_vevent(vevent: &Component) -> CoreResult<Option<Event>> {
    let Some(uid) = vevent.find_prop("UID").map(|p| p.val.to_string()) else {
        tracing::warn!("skipping VEVENT without UID");
        return Ok(None);
    };
    let Some(start) = vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
    else {
        tracing::warn!(uid = %uid, "skipping VEVENT without DTSTART");
        return Ok(None);
    };
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
        .or_else(|| {
            let duration = parse_duration(vevent.find_prop("DURATION")?.val.as_ref())?;
            Some(start.shifted(duration))
        })
        .unwrap_or_else(|| default_end(&start));

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let sequence = vevent
        .find_prop("SEQUENCE")
        .and_then(|p| p.val.as_ref().parse().ok());

    let status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        })
        .unwrap_or(EventStatus::Confirmed);

    // Recurrence (RRULE, RDATE, EXDATE)
    let rules = vevent
        .properties
        .iter()
        .filter(|p| p.name == "RRULE")
        .map(|p| p.val.as_ref().parse::<RecurrenceRule>())
        .collect::<Result<Vec<_>, _>>()?;
    let rdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "RDATE")
        .flat_map(parse_date_list_property)
        .collect();
    let exdates: Vec<EventTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_date_list_property)
        .collect();
    let recurrence = (!rules.is_empty() || !rdates.is_empty() || !exdates.is_empty()).then_some(Recurrence {
        rules,
        rdates,
        exdates,
    });

    // RECURRENCE-ID for exception instances
    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time);

    // Only the first VALARM is kept
    let reminder = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .find_map(|alarm| parse_trigger(alarm.find_prop("TRIGGER")?));

    // Custom X- properties, preserved for round-tripping
    let custom_properties: Vec<(String, String)> = vevent
        .properties
        .iter()
        .filter(|p| p.name.as_ref().starts_with("X-"))
        .map(|p| (p.name.to_string(), p.val.to_string()))
        .collect();

    Ok(Some(Event {
        uid,
        summary,
        description,
        location,
        start,
        end,
        status,
        recurrence,
        recurrence_id,
        reminder,
        sequence,
        custom_properties,
    }))
}

/// RFC 5545: a missing DTEND means one day for dates, zero length otherwise.
fn default_end(start: &EventTime) -> EventTime {
    match start {
        EventTime::Date(d) => EventTime::Date(*d + Duration::days(1)),
        other => other.clone(),
    }
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// Values of an RDATE or EXDATE property. One property may list several
/// comma separated values, all in the frame its TZID or VALUE=DATE
/// parameter gives (`EXDATE;TZID=Europe/Helsinki:20240108T100000,20240115T100000`).
///
/// RDATE periods (`VALUE=PERIOD`) are not supported and yield nothing.
fn parse_date_list_property(prop: &Property) -> Vec<EventTime> {
    let param = |key: &str| {
        prop.params
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
    };
    let tzid = param("TZID");
    let value_type = param("VALUE");
    if value_type.as_deref() == Some("PERIOD") {
        return Vec::new();
    }
    let is_date = value_type.as_deref() == Some("DATE");

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(EventTime::Date)
            } else if let Some(ref tz) = tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::DateTimeZoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if let Some(utc) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::DateTimeUtc(dt.and_utc()))
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(EventTime::DateTimeFloating)
            }
        })
        .collect()
}

/// Signed ISO 8601 duration (`-PT15M`, `P1D`).
fn parse_duration(value: &str) -> Option<Duration> {
    let negative = value.starts_with('-');
    let unsigned = value.trim_start_matches(['-', '+']);
    let duration = iso8601::duration(unsigned).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let duration = Duration::from_std(std_duration).ok()?;
    Some(if negative { -duration } else { duration })
}

/// TRIGGER relative to the start (`-PT15M` is 15 minutes before) or at an
/// absolute UTC time (`VALUE=DATE-TIME`).
fn parse_trigger(prop: &Property) -> Option<Reminder> {
    let value = prop.val.as_ref();
    let absolute = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE-TIME"));
    if absolute {
        let naive = NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S").ok()?;
        return Some(Reminder::At(naive.and_utc()));
    }
    let offset = parse_duration(value)?;
    Some(Reminder::Before {
        seconds: -offset.num_seconds(),
    })
}
