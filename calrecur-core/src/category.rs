//! The ten recurrence categories an editor offers, and the mapping between
//! them and full recurrence rules.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventTime;
use crate::rule::{Frequency, Recurrence, RecurrenceEnd, RecurrenceKind, RecurrenceRule, WeekdayPosition};
use crate::time::{local_to_instant, zone_named};
use crate::weekday::WeekdaySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecurrenceCategory {
    Once,
    Daily,
    Weekly,
    Biweekly,
    WeeklyByDays,
    Monthly,
    MonthlyByDayOfWeek,
    MonthlyByLastDayOfWeek,
    Yearly,
    /// Anything the other categories cannot express. Never rebuilt.
    Custom,
}

impl RecurrenceCategory {
    pub const ALL: [RecurrenceCategory; 10] = [
        RecurrenceCategory::Once,
        RecurrenceCategory::Daily,
        RecurrenceCategory::Weekly,
        RecurrenceCategory::Biweekly,
        RecurrenceCategory::WeeklyByDays,
        RecurrenceCategory::Monthly,
        RecurrenceCategory::MonthlyByDayOfWeek,
        RecurrenceCategory::MonthlyByLastDayOfWeek,
        RecurrenceCategory::Yearly,
        RecurrenceCategory::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceCategory::Once => "once",
            RecurrenceCategory::Daily => "daily",
            RecurrenceCategory::Weekly => "weekly",
            RecurrenceCategory::Biweekly => "biweekly",
            RecurrenceCategory::WeeklyByDays => "weekly-by-days",
            RecurrenceCategory::Monthly => "monthly",
            RecurrenceCategory::MonthlyByDayOfWeek => "monthly-by-day-of-week",
            RecurrenceCategory::MonthlyByLastDayOfWeek => "monthly-by-last-day-of-week",
            RecurrenceCategory::Yearly => "yearly",
            RecurrenceCategory::Custom => "custom",
        }
    }

    /// Categories whose parameters live outside the category value itself
    /// (the weekday set, or the reference date).
    fn has_implicit_parameters(self) -> bool {
        matches!(
            self,
            RecurrenceCategory::MonthlyByDayOfWeek
                | RecurrenceCategory::MonthlyByLastDayOfWeek
                | RecurrenceCategory::WeeklyByDays
        )
    }
}

impl fmt::Display for RecurrenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        RecurrenceCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = RecurrenceCategory::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown recurrence category '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// Classify an event's recurrence.
///
/// `reference_start` is the event start; positional monthly rules only count
/// as "by day of week" when their weekday is the start's weekday.
pub fn classify(recurrence: Option<&Recurrence>, reference_start: &EventTime) -> RecurrenceCategory {
    let Some(recurrence) = recurrence.filter(|r| r.recurs()) else {
        return RecurrenceCategory::Once;
    };
    let [rule] = recurrence.rules.as_slice() else {
        return RecurrenceCategory::Custom;
    };

    match (rule.kind(), rule.interval) {
        (RecurrenceKind::Daily, 1) => RecurrenceCategory::Daily,
        (RecurrenceKind::Weekly, 1) if rule.by_day.is_empty() => RecurrenceCategory::Weekly,
        (RecurrenceKind::Weekly, 1) => RecurrenceCategory::WeeklyByDays,
        (RecurrenceKind::Weekly, 2) if rule.by_day.is_empty() => RecurrenceCategory::Biweekly,
        (RecurrenceKind::MonthlyByDay, 1) => RecurrenceCategory::Monthly,
        (RecurrenceKind::MonthlyByPosition, 1) => classify_position(rule, reference_start),
        (RecurrenceKind::YearlyByMonth, 1) => RecurrenceCategory::Yearly,
        _ => RecurrenceCategory::Custom,
    }
}

fn classify_position(rule: &RecurrenceRule, reference_start: &EventTime) -> RecurrenceCategory {
    let [position] = rule.by_day.as_slice() else {
        return RecurrenceCategory::Custom;
    };
    if position.weekday != reference_start.date().weekday() {
        return RecurrenceCategory::Custom;
    }
    match position.ordinal {
        Some(n) if n > 0 => RecurrenceCategory::MonthlyByDayOfWeek,
        Some(-1) => RecurrenceCategory::MonthlyByLastDayOfWeek,
        _ => RecurrenceCategory::Custom,
    }
}

/// Weekdays of a plain "every week on these days" rule; empty otherwise.
pub fn weekly_days(recurrence: Option<&Recurrence>) -> WeekdaySet {
    match recurrence.map(|r| r.rules.as_slice()) {
        Some([rule]) if rule.kind() == RecurrenceKind::Weekly && rule.interval == 1 => rule.weekdays(),
        _ => WeekdaySet::EMPTY,
    }
}

/// Rewrite `recurrence` so it expresses `category`.
///
/// The rule is only regenerated when the category changes, except for the
/// categories with implicit parameters, which are always regenerated.
/// `Once` clears the recurrence and `Custom` never rebuilds the rule.
/// Otherwise the first rule ends on `end_date` (inclusive) or recurs
/// forever when no end date is given. Rebuilding keeps RDATE and EXDATE.
pub fn apply(
    recurrence: &mut Option<Recurrence>,
    category: RecurrenceCategory,
    weekly_days: WeekdaySet,
    end_date: Option<NaiveDate>,
    reference_start: &EventTime,
) {
    let current = classify(recurrence.as_ref(), reference_start);
    let rebuild =
        category != RecurrenceCategory::Custom && (category != current || category.has_implicit_parameters());
    if rebuild {
        match build_rule(category, weekly_days, reference_start) {
            None => {
                *recurrence = None;
                return;
            }
            Some(rule) => {
                let recurrence = recurrence.get_or_insert_with(Recurrence::default);
                recurrence.rules = vec![rule];
            }
        }
    }

    if category == RecurrenceCategory::Once {
        return;
    }
    if let Some(rule) = recurrence.as_mut().and_then(|r| r.rules.first_mut()) {
        rule.end = match end_date {
            Some(date) => RecurrenceEnd::Until(until_for(date, reference_start)),
            None => RecurrenceEnd::Forever,
        };
    }
}

/// Rule for a category; `None` for `Once` and `Custom`.
fn build_rule(
    category: RecurrenceCategory,
    weekly_days: WeekdaySet,
    reference_start: &EventTime,
) -> Option<RecurrenceRule> {
    let date = reference_start.date();
    let rule = match category {
        RecurrenceCategory::Once | RecurrenceCategory::Custom => return None,
        RecurrenceCategory::Daily => RecurrenceRule::new(Frequency::Daily),
        RecurrenceCategory::Weekly => RecurrenceRule::new(Frequency::Weekly),
        RecurrenceCategory::Biweekly => RecurrenceRule::new(Frequency::Weekly).with_interval(2),
        RecurrenceCategory::WeeklyByDays => RecurrenceRule::new(Frequency::Weekly)
            .with_by_day(weekly_days.iter().map(WeekdayPosition::every).collect()),
        RecurrenceCategory::Monthly => RecurrenceRule::new(Frequency::Monthly),
        RecurrenceCategory::MonthlyByDayOfWeek => {
            // Day 1-7 is the first such weekday, 8-14 the second, and so on.
            let nth = ((date.day() - 1) / 7 + 1) as i16;
            RecurrenceRule::new(Frequency::Monthly).with_by_day(vec![WeekdayPosition::nth(nth, date.weekday())])
        }
        RecurrenceCategory::MonthlyByLastDayOfWeek => {
            RecurrenceRule::new(Frequency::Monthly).with_by_day(vec![WeekdayPosition::nth(-1, date.weekday())])
        }
        RecurrenceCategory::Yearly => RecurrenceRule::new(Frequency::Yearly),
    };
    Some(rule)
}

/// UNTIL value for the inclusive end date `date`, in the series' frame.
fn until_for(date: NaiveDate, reference_start: &EventTime) -> EventTime {
    let end_of_day = date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN));
    match reference_start {
        EventTime::Date(_) => EventTime::Date(date),
        EventTime::DateTimeFloating(_) => EventTime::DateTimeFloating(end_of_day),
        EventTime::DateTimeUtc(_) => EventTime::DateTimeUtc(end_of_day.and_utc()),
        EventTime::DateTimeZoned { tzid, .. } => match zone_named(tzid) {
            Some(tz) => EventTime::DateTimeUtc(local_to_instant(end_of_day, tz).with_timezone(&Utc)),
            None => EventTime::DateTimeFloating(end_of_day),
        },
    }
}
