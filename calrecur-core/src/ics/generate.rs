//! ICS file generation.

use icalendar::{Alarm, Calendar, Component, EventLike, Property, Trigger, ValueType};

use crate::error::CoreResult;
use crate::event::{Event, EventStatus, EventTime, Reminder};

/// Generate .ics content holding `events` in one calendar.
pub fn generate_ics(events: &[Event]) -> CoreResult<String> {
    let mut cal = Calendar::new();
    // DTSTAMP is required by RFC 5545 but carries no meaning for us
    let dtstamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    for event in events {
        cal.push(to_ics_event(event, &dtstamp));
    }
    let cal = cal.done();

    Ok(strip_ics_bloat(&cal.to_string()))
}

fn to_ics_event(event: &Event, dtstamp: &str) -> icalendar::Event {
    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.summary(&event.summary);
    ics_event.add_property("DTSTAMP", dtstamp);

    if let Some(seq) = event.sequence {
        ics_event.add_property("SEQUENCE", seq.to_string());
    }

    add_datetime_property(&mut ics_event, "DTSTART", &event.start);
    add_datetime_property(&mut ics_event, "DTEND", &event.end);

    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }
    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    if let Some(status) = status_value(&event.status) {
        ics_event.add_property("STATUS", status);
    }

    if let Some(ref recurrence) = event.recurrence {
        for rule in &recurrence.rules {
            ics_event.append_multi_property(Property::new("RRULE", rule.to_string()));
        }
        for rdate in &recurrence.rdates {
            add_date_list_property(&mut ics_event, "RDATE", rdate);
        }
        for exdate in &recurrence.exdates {
            add_date_list_property(&mut ics_event, "EXDATE", exdate);
        }
    }

    if let Some(ref recurrence_id) = event.recurrence_id {
        add_datetime_property(&mut ics_event, "RECURRENCE-ID", recurrence_id);
    }

    if let Some(ref reminder) = event.reminder {
        ics_event.alarm(to_alarm(reminder));
    }

    // Custom properties, preserved for round-tripping
    for (key, value) in &event.custom_properties {
        ics_event.add_property(key, value);
    }

    ics_event.done()
}

/// CONFIRMED is implied and left out.
fn status_value(status: &EventStatus) -> Option<&'static str> {
    match status {
        EventStatus::Confirmed => None,
        EventStatus::Tentative => Some("TENTATIVE"),
        EventStatus::Cancelled => Some("CANCELLED"),
    }
}

/// Display alarm with only the properties RFC 5545 requires.
fn to_alarm(reminder: &Reminder) -> Alarm {
    match reminder {
        Reminder::Before { seconds } if *seconds >= 0 => Alarm::display(
            "Reminder",
            Trigger::before_start(chrono::Duration::seconds(*seconds)),
        ),
        Reminder::Before { seconds } => {
            let mut alarm = Alarm::display("Reminder", Trigger::before_start(chrono::Duration::zero()));
            alarm.add_property("TRIGGER", format!("PT{}S", -seconds));
            alarm
        }
        Reminder::At(at) => {
            let mut alarm = Alarm::display("Reminder", Trigger::before_start(chrono::Duration::zero()));
            let mut prop = Property::new("TRIGGER", at.format("%Y%m%dT%H%M%SZ").to_string());
            prop.add_parameter("VALUE", "DATE-TIME");
            alarm.append_property(prop);
            alarm
        }
    }
}

/// Our own PRODID, no default CALSCALE, and no DTSTAMP/UID lines in
/// alarms.
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_valarm = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:CALRECUR\r\n");
            continue;
        }
        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }
        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    ics_event.append_property(time_property(name, time));
}

/// Add one RDATE/EXDATE value as its own property
fn add_date_list_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    ics_event.append_multi_property(time_property(name, time));
}

fn time_property(name: &str, time: &EventTime) -> Property {
    let mut prop = Property::new(name, time.to_ics_string());
    match time {
        EventTime::Date(_) => {
            prop.append_parameter(ValueType::Date);
        }
        EventTime::DateTimeZoned { tzid, .. } => {
            prop.add_parameter("TZID", tzid);
        }
        EventTime::DateTimeUtc(_) | EventTime::DateTimeFloating(_) => {}
    }
    prop
}
