//! RFC 5545 recurrence rules.
//!
//! [`RecurrenceRule`] is one RRULE; [`Recurrence`] bundles the rules of an
//! event with its RDATE and EXDATE lists. RRULE text is read and written
//! through the `rrule` crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Month, Utc, Weekday};
use rrule::{NWeekday, RRule, RRuleError, Unvalidated};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EventTime;
use crate::time::{local_to_instant, zone_named};
use crate::weekday::{weekday_code, WeekdaySet};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleParseError {
    #[error(transparent)]
    Rule(#[from] RRuleError),

    #[error("invalid weekday: {0}")]
    InvalidWeekday(String),

    #[error("INTERVAL must be at least 1")]
    ZeroInterval,

    #[error("COUNT and UNTIL are mutually exclusive")]
    CountAndUntil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl From<rrule::Frequency> for Frequency {
    fn from(freq: rrule::Frequency) -> Self {
        match freq {
            rrule::Frequency::Secondly => Frequency::Secondly,
            rrule::Frequency::Minutely => Frequency::Minutely,
            rrule::Frequency::Hourly => Frequency::Hourly,
            rrule::Frequency::Daily => Frequency::Daily,
            rrule::Frequency::Weekly => Frequency::Weekly,
            rrule::Frequency::Monthly => Frequency::Monthly,
            rrule::Frequency::Yearly => Frequency::Yearly,
        }
    }
}

impl From<Frequency> for rrule::Frequency {
    fn from(freq: Frequency) -> Self {
        match freq {
            Frequency::Secondly => rrule::Frequency::Secondly,
            Frequency::Minutely => rrule::Frequency::Minutely,
            Frequency::Hourly => rrule::Frequency::Hourly,
            Frequency::Daily => rrule::Frequency::Daily,
            Frequency::Weekly => rrule::Frequency::Weekly,
            Frequency::Monthly => rrule::Frequency::Monthly,
            Frequency::Yearly => rrule::Frequency::Yearly,
        }
    }
}

/// One BYDAY entry: an optional ordinal (`-1` = last) and a weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekdayPosition {
    pub ordinal: Option<i16>,
    pub weekday: Weekday,
}

impl WeekdayPosition {
    pub fn every(weekday: Weekday) -> Self {
        WeekdayPosition { ordinal: None, weekday }
    }

    pub fn nth(ordinal: i16, weekday: Weekday) -> Self {
        WeekdayPosition {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

impl From<NWeekday> for WeekdayPosition {
    fn from(day: NWeekday) -> Self {
        match day {
            NWeekday::Every(weekday) => WeekdayPosition::every(weekday),
            NWeekday::Nth(n, weekday) => WeekdayPosition::nth(n, weekday),
        }
    }
}

impl fmt::Display for WeekdayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(n) => write!(f, "{}{}", n, weekday_code(self.weekday)),
            None => write!(f, "{}", weekday_code(self.weekday)),
        }
    }
}

/// How a rule ends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecurrenceEnd {
    #[default]
    Forever,
    Count(u32),
    /// Inclusive last possible instance
    Until(EventTime),
}

/// Shape of a rule as the calendar backend sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecurrenceKind {
    SubDaily,
    Daily,
    Weekly,
    MonthlyByDay,
    MonthlyByPosition,
    YearlyByMonth,
    YearlyByDay,
    YearlyByPosition,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u16,
    pub by_day: Vec<WeekdayPosition>,
    pub by_month_day: Vec<i8>,
    pub by_month: Vec<u8>,
    pub by_year_day: Vec<i16>,
    pub by_week_no: Vec<i8>,
    pub by_set_pos: Vec<i32>,
    pub by_hour: Vec<u8>,
    pub by_minute: Vec<u8>,
    pub by_second: Vec<u8>,
    pub week_start: Option<Weekday>,
    pub end: RecurrenceEnd,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        RecurrenceRule {
            frequency,
            interval: 1,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            by_year_day: Vec::new(),
            by_week_no: Vec::new(),
            by_set_pos: Vec::new(),
            by_hour: Vec::new(),
            by_minute: Vec::new(),
            by_second: Vec::new(),
            week_start: None,
            end: RecurrenceEnd::Forever,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: u16) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_by_day(mut self, by_day: Vec<WeekdayPosition>) -> Self {
        self.by_day = by_day;
        self
    }

    #[must_use]
    pub fn with_end(mut self, end: RecurrenceEnd) -> Self {
        self.end = end;
        self
    }

    /// Weekdays named in BYDAY, ignoring ordinals.
    pub fn weekdays(&self) -> WeekdaySet {
        self.by_day.iter().map(|p| p.weekday).collect()
    }

    /// Classify the rule's shape.
    ///
    /// Rules using parts the simple shapes cannot express (BYSETPOS, BYWEEKNO,
    /// BYHOUR and friends, or a BY part that does not belong to the
    /// frequency) are `Other`.
    pub fn kind(&self) -> RecurrenceKind {
        if !self.by_set_pos.is_empty() || !self.by_second.is_empty() || !self.by_week_no.is_empty() {
            return RecurrenceKind::Other;
        }
        if !self.by_minute.is_empty() || !self.by_hour.is_empty() {
            return RecurrenceKind::Other;
        }
        let yearly = self.frequency == Frequency::Yearly;
        if (!self.by_year_day.is_empty() || !self.by_month.is_empty()) && !yearly {
            return RecurrenceKind::Other;
        }
        if !self.by_day.is_empty()
            && !matches!(self.frequency, Frequency::Weekly | Frequency::Monthly | Frequency::Yearly)
        {
            return RecurrenceKind::Other;
        }

        match self.frequency {
            Frequency::Secondly => RecurrenceKind::Other,
            Frequency::Minutely | Frequency::Hourly => RecurrenceKind::SubDaily,
            Frequency::Daily => RecurrenceKind::Daily,
            Frequency::Weekly => RecurrenceKind::Weekly,
            Frequency::Monthly => {
                if self.by_day.is_empty() {
                    RecurrenceKind::MonthlyByDay
                } else if self.by_month_day.is_empty() {
                    RecurrenceKind::MonthlyByPosition
                } else {
                    RecurrenceKind::Other
                }
            }
            Frequency::Yearly => {
                if !self.by_day.is_empty() {
                    if self.by_month_day.is_empty() && self.by_year_day.is_empty() {
                        RecurrenceKind::YearlyByPosition
                    } else {
                        RecurrenceKind::Other
                    }
                } else if !self.by_year_day.is_empty() {
                    if self.by_month.is_empty() && self.by_month_day.is_empty() {
                        RecurrenceKind::YearlyByDay
                    } else {
                        RecurrenceKind::Other
                    }
                } else {
                    RecurrenceKind::YearlyByMonth
                }
            }
        }
    }

    /// RRULE value text for the `rrule` crate, with UNTIL always in UTC.
    ///
    /// Zoned and UTC series need a UTC UNTIL; date and floating UNTIL values
    /// are read as wall clock in `zone`.
    pub(crate) fn to_expansion_string(&self, zone: chrono_tz::Tz) -> String {
        let mut rule = self.clone();
        if let RecurrenceEnd::Until(until) = &self.end {
            let instant = match until {
                EventTime::Date(d) => {
                    local_to_instant(d.and_hms_opt(23, 59, 59).unwrap_or_default(), zone).with_timezone(&Utc)
                }
                other => other.resolve(zone).with_timezone(&Utc),
            };
            rule.end = RecurrenceEnd::Until(EventTime::DateTimeUtc(instant));
        }
        rule.to_string()
    }

    /// The rule without BYDAY and UNTIL, as the `rrule` crate models it.
    fn to_engine_rule(&self) -> RRule<Unvalidated> {
        let months: Vec<Month> = self
            .by_month
            .iter()
            .filter_map(|m| Month::try_from(*m).ok())
            .collect();
        let mut rule = RRule::<Unvalidated>::new(self.frequency.into())
            .interval(self.interval)
            .by_set_pos(self.by_set_pos.clone())
            .by_month(&months)
            .by_month_day(self.by_month_day.clone())
            .by_year_day(self.by_year_day.clone())
            .by_week_no(self.by_week_no.clone())
            .by_hour(self.by_hour.clone())
            .by_minute(self.by_minute.clone())
            .by_second(self.by_second.clone());
        if let Some(week_start) = self.week_start {
            rule = rule.week_start(week_start);
        }
        if let RecurrenceEnd::Count(count) = self.end {
            rule = rule.count(count);
        }
        rule
    }

    fn until_text(&self) -> Option<String> {
        match &self.end {
            RecurrenceEnd::Until(EventTime::DateTimeZoned { datetime, tzid }) => {
                // UNTIL cannot carry a TZID; write it in UTC when the zone is known.
                Some(match zone_named(tzid) {
                    Some(tz) => local_to_instant(*datetime, tz)
                        .with_timezone(&Utc)
                        .format("%Y%m%dT%H%M%SZ")
                        .to_string(),
                    None => datetime.format("%Y%m%dT%H%M%S").to_string(),
                })
            }
            RecurrenceEnd::Until(until) => Some(until.to_ics_string()),
            _ => None,
        }
    }
}

/// Whether the UNTIL part of `text` is a DATE value. The rule engine reads a
/// DATE UNTIL as local midnight, which looks like any other floating time.
fn until_is_date(text: &str) -> bool {
    text.split(';')
        .filter_map(|part| part.split_once('='))
        .any(|(key, value)| key.trim().eq_ignore_ascii_case("UNTIL") && !value.contains(['T', 't']))
}

fn end_of(rule: &RRule<Unvalidated>, date_only: bool) -> Result<RecurrenceEnd, RuleParseError> {
    match (rule.get_count(), rule.get_until()) {
        (Some(_), Some(_)) => Err(RuleParseError::CountAndUntil),
        (Some(count), None) => Ok(RecurrenceEnd::Count(count)),
        (None, Some(until)) => Ok(RecurrenceEnd::Until(until_time(until, date_only))),
        (None, None) => Ok(RecurrenceEnd::Forever),
    }
}

fn until_time(until: &DateTime<rrule::Tz>, date_only: bool) -> EventTime {
    if !until.timezone().is_local() {
        EventTime::DateTimeUtc(until.with_timezone(&Utc))
    } else if date_only {
        EventTime::Date(until.date_naive())
    } else {
        EventTime::DateTimeFloating(until.naive_local())
    }
}

impl FromStr for RecurrenceRule {
    type Err = RuleParseError;

    /// Parses RRULE value text, with or without the `RRULE:` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let parsed: RRule<Unvalidated> = text.parse()?;
        if parsed.get_interval() == 0 {
            return Err(RuleParseError::ZeroInterval);
        }

        let week_start = match parsed.get_week_start() {
            Weekday::Mon => None,
            other => Some(other),
        };
        Ok(RecurrenceRule {
            frequency: parsed.get_freq().into(),
            interval: parsed.get_interval(),
            by_day: parsed.get_by_weekday().iter().copied().map(WeekdayPosition::from).collect(),
            by_month_day: parsed.get_by_month_day().to_vec(),
            by_month: parsed.get_by_month().to_vec(),
            by_year_day: parsed.get_by_year_day().to_vec(),
            by_week_no: parsed.get_by_week_no().to_vec(),
            by_set_pos: parsed.get_by_set_pos().to_vec(),
            by_hour: parsed.get_by_hour().to_vec(),
            by_minute: parsed.get_by_minute().to_vec(),
            by_second: parsed.get_by_second().to_vec(),
            week_start,
            end: end_of(&parsed, until_is_date(text))?,
        })
    }
}

impl fmt::Display for RecurrenceRule {
    /// Canonical RRULE value text (no `RRULE:` prefix), in the part order
    /// of the `rrule` crate.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engine = self.to_engine_rule().to_string();
        let (freq, rest) = engine.split_once(';').unwrap_or((engine.as_str(), ""));

        let mut parts = vec![freq.to_string()];
        if let Some(until) = self.until_text() {
            parts.push(format!("UNTIL={}", until));
        }
        if !rest.is_empty() {
            parts.push(rest.to_string());
        }
        // rrule prints a first-of-period weekday as a bare code, which reads
        // as every such weekday.
        if !self.by_day.is_empty() {
            let days: Vec<String> = self.by_day.iter().map(ToString::to_string).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        f.write_str(&parts.join(";"))
    }
}

/// All recurrence data of an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Recurrence {
    pub rules: Vec<RecurrenceRule>,
    pub rdates: Vec<EventTime>,
    pub exdates: Vec<EventTime>,
}

impl Recurrence {
    pub fn from_rule(rule: RecurrenceRule) -> Self {
        Recurrence {
            rules: vec![rule],
            rdates: Vec::new(),
            exdates: Vec::new(),
        }
    }

    /// True when there is something to generate instances from.
    pub fn recurs(&self) -> bool {
        !self.rules.is_empty() || !self.rdates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rrule::ParseError;

    fn rule(text: &str) -> RecurrenceRule {
        text.parse().unwrap()
    }

    #[test]
    fn parse_basic_weekly() {
        let r = rule("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE");
        assert_eq!(r.frequency, Frequency::Weekly);
        assert_eq!(r.interval, 2);
        assert_eq!(r.weekdays().to_string(), "MO,WE");
        assert_eq!(r.end, RecurrenceEnd::Forever);
        assert_eq!(r.week_start, None);
    }

    #[test]
    fn parse_accepts_prefix_and_ordinals() {
        let r = rule("RRULE:FREQ=MONTHLY;BYDAY=-1FR");
        assert_eq!(r.by_day, vec![WeekdayPosition::nth(-1, Weekday::Fri)]);
        let r = rule("FREQ=MONTHLY;BYDAY=+3TU");
        assert_eq!(r.by_day, vec![WeekdayPosition::nth(3, Weekday::Tue)]);
        let r = rule("FREQ=YEARLY;BYDAY=20MO;WKST=SU");
        assert_eq!(r.by_day, vec![WeekdayPosition::nth(20, Weekday::Mon)]);
        assert_eq!(r.week_start, Some(Weekday::Sun));
    }

    #[test]
    fn parse_until_forms() {
        assert_eq!(
            rule("FREQ=DAILY;UNTIL=20240131").end,
            RecurrenceEnd::Until(EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()))
        );
        assert_eq!(
            rule("FREQ=DAILY;UNTIL=20240131T235959Z").end,
            RecurrenceEnd::Until(EventTime::DateTimeUtc(
                Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap()
            ))
        );
        assert_eq!(
            rule("FREQ=DAILY;UNTIL=20240131T120000").end,
            RecurrenceEnd::Until(EventTime::DateTimeFloating(
                NaiveDate::from_ymd_opt(2024, 1, 31)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap()
            ))
        );
        assert_eq!(rule("FREQ=DAILY;COUNT=5").end, RecurrenceEnd::Count(5));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            "INTERVAL=2".parse::<RecurrenceRule>(),
            Err(RuleParseError::Rule(RRuleError::ParserError(ParseError::MissingProperty(_))))
        ));
        assert!("FREQ=FORTNIGHTLY".parse::<RecurrenceRule>().is_err());
        assert_eq!(
            "FREQ=DAILY;INTERVAL=0".parse::<RecurrenceRule>(),
            Err(RuleParseError::ZeroInterval)
        );
        assert!("FREQ=WEEKLY;BYDAY=XX".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=MONTHLY;BYMONTHDAY=40".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=DAILY;COLOR=RED".parse::<RecurrenceRule>().is_err());
        assert_eq!(
            "FREQ=DAILY;COUNT=3;UNTIL=20240101".parse::<RecurrenceRule>(),
            Err(RuleParseError::CountAndUntil)
        );
    }

    #[test]
    fn display_is_canonical() {
        let r = rule("BYDAY=MO,FR;FREQ=weekly;interval=1;COUNT=4");
        assert_eq!(r.to_string(), "FREQ=WEEKLY;COUNT=4;BYDAY=MO,FR");
        let r = rule("FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU;WKST=SU");
        assert_eq!(r.to_string(), "FREQ=YEARLY;WKST=SU;BYMONTH=3;BYDAY=-1SU");
        let r = rule("FREQ=MONTHLY;BYDAY=MO;WKST=MO;INTERVAL=2");
        assert_eq!(r.to_string(), "FREQ=MONTHLY;INTERVAL=2;BYDAY=MO");
    }

    #[test]
    fn display_keeps_first_weekday_ordinal() {
        let r = RecurrenceRule::new(Frequency::Monthly).with_by_day(vec![WeekdayPosition::nth(1, Weekday::Mon)]);
        assert_eq!(r.to_string(), "FREQ=MONTHLY;BYDAY=1MO");
        assert_eq!(rule(&r.to_string()), r);
    }

    #[test]
    fn display_writes_until_after_frequency() {
        let r = rule("FREQ=WEEKLY;BYDAY=TU;UNTIL=20240131;INTERVAL=3");
        assert_eq!(r.to_string(), "FREQ=WEEKLY;UNTIL=20240131;INTERVAL=3;BYDAY=TU");

        let zoned = RecurrenceRule::new(Frequency::Daily).with_end(RecurrenceEnd::Until(EventTime::DateTimeZoned {
            datetime: NaiveDate::from_ymd_opt(2024, 1, 31)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap(),
            tzid: "Europe/Helsinki".to_string(),
        }));
        assert_eq!(zoned.to_string(), "FREQ=DAILY;UNTIL=20240131T215959Z");
    }

    #[test]
    fn kind_matches_backend_shapes() {
        assert_eq!(rule("FREQ=DAILY").kind(), RecurrenceKind::Daily);
        assert_eq!(rule("FREQ=WEEKLY;BYDAY=MO").kind(), RecurrenceKind::Weekly);
        assert_eq!(rule("FREQ=MONTHLY").kind(), RecurrenceKind::MonthlyByDay);
        assert_eq!(rule("FREQ=MONTHLY;BYMONTHDAY=15").kind(), RecurrenceKind::MonthlyByDay);
        assert_eq!(rule("FREQ=MONTHLY;BYDAY=2TU").kind(), RecurrenceKind::MonthlyByPosition);
        assert_eq!(rule("FREQ=YEARLY").kind(), RecurrenceKind::YearlyByMonth);
        assert_eq!(rule("FREQ=YEARLY;BYYEARDAY=100").kind(), RecurrenceKind::YearlyByDay);
        assert_eq!(rule("FREQ=YEARLY;BYMONTH=5;BYDAY=2SU").kind(), RecurrenceKind::YearlyByPosition);
        assert_eq!(rule("FREQ=HOURLY").kind(), RecurrenceKind::SubDaily);
    }

    #[test]
    fn kind_other_for_unsupported_parts() {
        assert_eq!(rule("FREQ=MONTHLY;BYDAY=MO,TU;BYSETPOS=-1").kind(), RecurrenceKind::Other);
        assert_eq!(rule("FREQ=DAILY;BYHOUR=9,17").kind(), RecurrenceKind::Other);
        assert_eq!(rule("FREQ=DAILY;BYDAY=MO").kind(), RecurrenceKind::Other);
        assert_eq!(rule("FREQ=MONTHLY;BYMONTH=1").kind(), RecurrenceKind::Other);
        assert_eq!(rule("FREQ=MONTHLY;BYDAY=1MO;BYMONTHDAY=1").kind(), RecurrenceKind::Other);
        assert_eq!(rule("FREQ=YEARLY;BYYEARDAY=1;BYMONTH=1").kind(), RecurrenceKind::Other);
    }

    #[test]
    fn expansion_string_converts_date_until_to_utc() {
        let r = rule("FREQ=DAILY;UNTIL=20240131");
        assert_eq!(
            r.to_expansion_string(chrono_tz::Europe::Helsinki),
            "FREQ=DAILY;UNTIL=20240131T215959Z"
        );
    }

    #[test]
    fn recurrence_recurs_with_rdate_only() {
        let mut rec = Recurrence::default();
        assert!(!rec.recurs());
        rec.rdates
            .push(EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(rec.recurs());
    }
}
