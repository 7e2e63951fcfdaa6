//! Instance generation for recurring events.
//!
//! RRULEs are expanded with the `rrule` crate; RDATEs and the event start are
//! merged in afterwards. Every instant is expressed in one canonical zone.
//! EXDATEs are *not* applied by [`Expander::instances`]: callers decide
//! whether an excluded slot is covered by a detached exception.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventTime};
use crate::exception::ExceptionIndex;
use crate::locate::Occurrence;
use crate::rule::{RecurrenceEnd, RecurrenceRule};
use crate::time::zone_named;

/// Searches widen through these windows before giving up at the search
/// horizon.
const SEARCH_WINDOWS_DAYS: [i64; 4] = [7, 90, 730, 7300];

#[derive(Debug, Clone)]
pub struct Expander {
    zone: Tz,
    horizon: Duration,
    max_instances: usize,
}

impl Expander {
    pub fn new(zone: Tz, horizon: Duration, max_instances: usize) -> Self {
        Expander {
            zone,
            horizon,
            max_instances: max_instances.max(1),
        }
    }

    pub fn from_settings(settings: &Settings) -> CoreResult<Self> {
        Ok(Expander::new(
            settings.canonical_zone(),
            settings.horizon()?,
            settings.max_instances,
        ))
    }

    /// The canonical zone every returned instant is expressed in.
    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// DTSTART line for the rule engine. Dates and floating times are pinned
    /// to the canonical zone.
    fn dtstart_line(&self, start: &EventTime) -> String {
        match start {
            EventTime::DateTimeUtc(dt) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
            EventTime::DateTimeZoned { datetime, tzid } if zone_named(tzid).is_some() => {
                format!("DTSTART;TZID={}:{}", tzid, datetime.format("%Y%m%dT%H%M%S"))
            }
            other => format!(
                "DTSTART;TZID={}:{}",
                self.zone.name(),
                other.naive().format("%Y%m%dT%H%M%S")
            ),
        }
    }

    /// Build the iCalendar text the `rrule` crate parses.
    fn build_rrule_string(&self, start: &EventTime, rules: &[RecurrenceRule]) -> String {
        let mut lines = vec![self.dtstart_line(start)];
        for rule in rules {
            lines.push(format!("RRULE:{}", rule.to_expansion_string(self.zone)));
        }
        lines.join("\n")
    }

    fn rule_set(&self, event: &Event, rules: &[RecurrenceRule]) -> CoreResult<RRuleSet> {
        let text = self.build_rrule_string(&event.start, rules);
        text.parse::<RRuleSet>().map_err(|e| {
            tracing::warn!(uid = %event.uid, rules = %text, error = %e, "rejected recurrence rule");
            CoreError::Expansion {
                uid: event.uid.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Rule instants in `[from, to]`, at most `limit` of them, earliest first.
    fn rule_instances(
        &self,
        event: &Event,
        rules: &[RecurrenceRule],
        from: &DateTime<Tz>,
        to: &DateTime<Tz>,
        limit: usize,
    ) -> CoreResult<Vec<DateTime<Tz>>> {
        if rules.is_empty() || from > to {
            return Ok(Vec::new());
        }
        let set = self.rule_set(event, rules)?;

        // Widen the window by a second on each side so the bounds are
        // inclusive whichever way the engine treats them, then filter.
        let tz: rrule::Tz = Utc.into();
        let after = (*from - Duration::seconds(1)).with_timezone(&tz);
        let before = (*to + Duration::seconds(1)).with_timezone(&tz);
        let cap = u16::try_from(limit.saturating_add(1)).unwrap_or(u16::MAX);

        let result = set.after(after).before(before).all(cap);
        if result.limited {
            tracing::debug!(uid = %event.uid, cap, "instance generation hit its cap");
        }
        Ok(result
            .dates
            .iter()
            .map(|dt| dt.with_timezone(&self.zone))
            .filter(|dt| dt >= from && dt <= to)
            .collect())
    }

    /// Raw instances of `event` in `[from, to]`: RRULE and RDATE instants
    /// plus the start itself, EXDATEs ignored.
    ///
    /// A non-recurring event has its start as its only instance. At most
    /// `max_instances` instants are returned, earliest first.
    pub fn instances(&self, event: &Event, from: &DateTime<Tz>, to: &DateTime<Tz>) -> CoreResult<Vec<DateTime<Tz>>> {
        let from = from.with_timezone(&self.zone);
        let to = to.with_timezone(&self.zone);
        let start = event.start.resolve(self.zone);

        let mut instances = match event.recurrence.as_ref().filter(|r| r.recurs()) {
            Some(recurrence) => {
                let mut found = self.rule_instances(event, &recurrence.rules, &from, &to, self.max_instances)?;
                found.extend(
                    recurrence
                        .rdates
                        .iter()
                        .map(|rdate| rdate.resolve(self.zone))
                        .filter(|dt| *dt >= from && *dt <= to),
                );
                found
            }
            None => Vec::new(),
        };
        if start >= from && start <= to {
            instances.push(start);
        }
        instances.sort();
        instances.dedup();
        instances.truncate(self.max_instances);
        Ok(instances)
    }

    /// True when the rule (or an RDATE, or the start) produces `instant`.
    pub fn recurs_at(&self, event: &Event, instant: &DateTime<Tz>) -> CoreResult<bool> {
        Ok(!self.instances(event, instant, instant)?.is_empty())
    }

    /// True when an EXDATE removes `instant` from the series. Date EXDATEs
    /// remove every instance on that day.
    pub fn is_excluded(&self, event: &Event, instant: &DateTime<Tz>) -> bool {
        let Some(recurrence) = &event.recurrence else {
            return false;
        };
        let instant = instant.with_timezone(&self.zone);
        recurrence.exdates.iter().any(|exdate| match exdate {
            EventTime::Date(d) => instant.date_naive() == *d,
            other => other.resolve(self.zone) == instant,
        })
    }

    /// First instance at or after `target`, within the search horizon.
    pub fn first_at_or_after(&self, event: &Event, target: &DateTime<Tz>) -> CoreResult<Option<DateTime<Tz>>> {
        self.first_matching(event, target, |_| true)
    }

    /// First instance at or after `target` that `accept` takes, within the
    /// search horizon.
    ///
    /// Instances are generated one window at a time and each window starts
    /// where the previous one ended.
    pub(crate) fn first_matching(
        &self,
        event: &Event,
        target: &DateTime<Tz>,
        mut accept: impl FnMut(&DateTime<Tz>) -> bool,
    ) -> CoreResult<Option<DateTime<Tz>>> {
        let mut from = *target;
        for span in self.search_windows() {
            let to = *target + span;
            if let Some(found) = self.instances(event, &from, &to)?.into_iter().find(|dt| accept(dt)) {
                return Ok(Some(found));
            }
            from = to + Duration::nanoseconds(1);
        }
        Ok(None)
    }

    /// Last instance strictly before `target`, within the search horizon.
    pub fn last_before(&self, event: &Event, target: &DateTime<Tz>) -> CoreResult<Option<DateTime<Tz>>> {
        let to = *target - Duration::nanoseconds(1);
        for span in self.search_windows() {
            let from = *target - span;
            if let Some(last) = self.instances(event, &from, &to)?.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }

    fn search_windows(&self) -> Vec<Duration> {
        let mut windows: Vec<Duration> = SEARCH_WINDOWS_DAYS
            .iter()
            .map(|days| Duration::days(*days))
            .filter(|span| *span < self.horizon)
            .collect();
        windows.push(self.horizon);
        windows
    }

    /// Inclusive last date of the first rule in the series' own frame.
    ///
    /// UNTIL rules end on the UNTIL date; COUNT rules on the date of their
    /// last instance. `None` when the rule runs forever or there is no rule.
    pub fn end_date(&self, event: &Event) -> CoreResult<Option<NaiveDate>> {
        let Some(rule) = event.recurrence.as_ref().and_then(|r| r.rules.first()) else {
            return Ok(None);
        };
        match &rule.end {
            RecurrenceEnd::Forever => Ok(None),
            RecurrenceEnd::Until(EventTime::Date(d)) => Ok(Some(*d)),
            RecurrenceEnd::Until(until) => {
                let instant = until.resolve(self.zone);
                Ok(Some(EventTime::like(&event.start, &instant).date()))
            }
            RecurrenceEnd::Count(n) => {
                let start = event.start.resolve(self.zone);
                let limit = start + self.horizon;
                let count = usize::try_from(*n).unwrap_or(usize::MAX);
                let instances = self.rule_instances(event, std::slice::from_ref(rule), &start, &limit, count)?;
                Ok(instances
                    .last()
                    .map(|last| EventTime::like(&event.start, last).date()))
            }
        }
    }

    /// Every occurrence overlapping `[from, to]`, earliest first.
    ///
    /// Exceptions replace the slot they were detached from; EXDATE'd slots
    /// without an exception are skipped. Exceptions whose slot the series no
    /// longer generates do not appear. Events that fail to expand are
    /// logged and left out.
    pub fn occurrences_between(
        &self,
        events: &[Event],
        exceptions: &ExceptionIndex,
        from: &DateTime<Tz>,
        to: &DateTime<Tz>,
    ) -> Vec<Occurrence> {
        let mut occurrences = Vec::new();
        for event in events.iter().filter(|e| !e.is_exception()) {
            let duration = event.duration(self.zone);
            // Occurrences starting before `from` may still overlap it.
            let window_start = *from - duration.max(Duration::zero());
            let slots = match self.instances(event, &window_start, to) {
                Ok(slots) => slots,
                Err(e) => {
                    tracing::warn!(uid = %event.uid, error = %e, "skipping event that failed to expand");
                    continue;
                }
            };
            for slot in slots {
                let occurrence = match exceptions.get(&event.uid, &slot) {
                    Some(instance) => Occurrence::detached(instance, slot, self.zone),
                    None if self.is_excluded(event, &slot) => continue,
                    None => Occurrence::computed(event, slot, self.zone),
                };
                if occurrence.overlaps(from, to) {
                    occurrences.push(occurrence);
                }
            }
        }
        occurrences.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.event_uid.cmp(&b.event_uid)));
        occurrences
    }

    /// Instance ids per calendar day between `from` and `to` inclusive.
    ///
    /// An occurrence covers every day from its start date to its end date,
    /// except that an end at midnight does not cover the day it starts.
    /// Days without occurrences are left out.
    pub fn daily_buckets(
        &self,
        occurrences: &[Occurrence],
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeMap<NaiveDate, Vec<String>> {
        let mut buckets: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        for occurrence in occurrences {
            let first = occurrence.start.date_naive();
            let end = occurrence.end.with_timezone(&self.zone);
            let ends_at_midnight = end.naive_local().time() == NaiveTime::MIN;
            let last = if ends_at_midnight && end > occurrence.start {
                end.date_naive().pred_opt().unwrap_or(first)
            } else {
                end.date_naive()
            };
            let mut day = first.max(from);
            while day <= last.min(to) {
                buckets
                    .entry(day)
                    .or_default()
                    .push(occurrence.instance_id());
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        }
        buckets
    }
}

/// Start of `date` in `zone`.
pub fn start_of_day(date: NaiveDate, zone: Tz) -> DateTime<Tz> {
    crate::time::local_to_instant(date.and_time(NaiveTime::MIN), zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Recurrence;
    use chrono::{Datelike, NaiveDateTime};

    fn naive(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        EventTime::DateTimeFloating(naive(y, m, d, h)).resolve(chrono_tz::UTC)
    }

    fn series(rule: &str) -> Event {
        let mut event = Event::new(
            "series",
            "Series",
            EventTime::DateTimeFloating(naive(2024, 1, 1, 10)),
            EventTime::DateTimeFloating(naive(2024, 1, 1, 11)),
        );
        event.recurrence = Some(Recurrence::from_rule(rule.parse().unwrap()));
        event
    }

    fn expander() -> Expander {
        Expander::new(chrono_tz::UTC, Duration::days(3650), 10_000)
    }

    #[test]
    fn weekly_instances_in_window() {
        let event = series("FREQ=WEEKLY");
        let found = expander()
            .instances(&event, &utc(2024, 1, 1, 0), &utc(2024, 1, 31, 0))
            .unwrap();
        let days: Vec<u32> = found.iter().map(|dt| dt.day()).collect();
        assert_eq!(days, vec![1, 8, 15, 22, 29]);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let event = series("FREQ=WEEKLY");
        let found = expander()
            .instances(&event, &utc(2024, 1, 8, 10), &utc(2024, 1, 15, 10))
            .unwrap();
        assert_eq!(found, vec![utc(2024, 1, 8, 10), utc(2024, 1, 15, 10)]);
    }

    #[test]
    fn rdates_merge_and_exdates_are_ignored() {
        let mut event = series("FREQ=WEEKLY;COUNT=2");
        let rec = event.recurrence.as_mut().unwrap();
        rec.rdates.push(EventTime::DateTimeFloating(naive(2024, 1, 3, 10)));
        rec.exdates.push(EventTime::DateTimeFloating(naive(2024, 1, 8, 10)));

        let expander = expander();
        let found = expander
            .instances(&event, &utc(2024, 1, 1, 0), &utc(2024, 12, 31, 0))
            .unwrap();
        assert_eq!(found, vec![utc(2024, 1, 1, 10), utc(2024, 1, 3, 10), utc(2024, 1, 8, 10)]);
        assert!(expander.is_excluded(&event, &utc(2024, 1, 8, 10)));
    }

    #[test]
    fn zoned_series_keeps_wall_clock_across_dst() {
        let mut event = Event::new(
            "zoned",
            "Zoned",
            EventTime::DateTimeZoned {
                datetime: naive(2024, 3, 25, 10),
                tzid: "Europe/Helsinki".to_string(),
            },
            EventTime::DateTimeZoned {
                datetime: naive(2024, 3, 25, 11),
                tzid: "Europe/Helsinki".to_string(),
            },
        );
        event.recurrence = Some(Recurrence::from_rule("FREQ=WEEKLY;COUNT=2".parse().unwrap()));
        let found = expander()
            .instances(&event, &utc(2024, 3, 1, 0), &utc(2024, 4, 30, 0))
            .unwrap();
        // 10:00 EET is 08:00 UTC, 10:00 EEST is 07:00 UTC.
        assert_eq!(found, vec![utc(2024, 3, 25, 8), utc(2024, 4, 1, 7)]);
    }

    #[test]
    fn first_and_last_searches() {
        let event = series("FREQ=WEEKLY;UNTIL=20240114T235959");
        let expander = expander();
        assert_eq!(
            expander.first_at_or_after(&event, &utc(2024, 1, 9, 10)).unwrap(),
            None
        );
        assert_eq!(
            expander.last_before(&event, &utc(2024, 1, 9, 10)).unwrap(),
            Some(utc(2024, 1, 8, 10))
        );
        assert_eq!(
            expander.first_at_or_after(&event, &utc(2024, 1, 8, 10)).unwrap(),
            Some(utc(2024, 1, 8, 10))
        );
    }

    #[test]
    fn first_at_or_after_widens_its_window() {
        let event = series("FREQ=YEARLY;COUNT=3");
        let expander = expander();
        assert_eq!(
            expander.first_at_or_after(&event, &utc(2024, 1, 2, 0)).unwrap(),
            Some(utc(2025, 1, 1, 10))
        );
        assert_eq!(
            expander.first_at_or_after(&event, &utc(2026, 1, 2, 0)).unwrap(),
            None
        );
    }

    #[test]
    fn first_matching_passes_over_rejected_instances() {
        let event = series("FREQ=DAILY");
        let found = expander()
            .first_matching(&event, &utc(2024, 1, 1, 0), |dt| dt.day() == 20)
            .unwrap();
        assert_eq!(found, Some(utc(2024, 1, 20, 10)));
    }

    #[test]
    fn last_before_widens_its_window() {
        let event = series("FREQ=YEARLY;COUNT=3");
        assert_eq!(
            expander().last_before(&event, &utc(2030, 6, 1, 0)).unwrap(),
            Some(utc(2026, 1, 1, 10))
        );
    }

    #[test]
    fn end_date_for_until_and_count() {
        let expander = expander();
        assert_eq!(
            expander.end_date(&series("FREQ=DAILY;UNTIL=20240131T235959")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31)
        );
        assert_eq!(
            expander.end_date(&series("FREQ=WEEKLY;COUNT=3")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(expander.end_date(&series("FREQ=DAILY")).unwrap(), None);
    }

    #[test]
    fn malformed_rule_is_an_expansion_error() {
        let event = series("FREQ=WEEKLY;BYMONTHDAY=15");
        assert!(matches!(
            expander().instances(&event, &utc(2024, 1, 1, 0), &utc(2024, 2, 1, 0)),
            Err(CoreError::Expansion { .. })
        ));
    }

    #[test]
    fn occurrences_substitute_exceptions_and_skip_exdates() {
        let expander = expander();
        let mut master = series("FREQ=WEEKLY");
        let mut instance = crate::exception::detach(&expander, &mut master, &utc(2024, 1, 8, 10)).unwrap();
        instance.start = EventTime::DateTimeFloating(naive(2024, 1, 8, 12));
        instance.end = EventTime::DateTimeFloating(naive(2024, 1, 8, 13));
        crate::exception::delete_occurrence(&expander, &mut master, &utc(2024, 1, 15, 10)).unwrap();

        let mut index = ExceptionIndex::new(chrono_tz::UTC);
        index.insert(instance).unwrap();

        let found = expander.occurrences_between(
            std::slice::from_ref(&master),
            &index,
            &utc(2024, 1, 1, 0),
            &utc(2024, 1, 23, 0),
        );
        let starts: Vec<_> = found.iter().map(|o| o.start).collect();
        assert_eq!(starts, vec![utc(2024, 1, 1, 10), utc(2024, 1, 8, 12), utc(2024, 1, 22, 10)]);
        assert!(found[1].detached);
        assert_eq!(found[1].recurrence_id, Some(utc(2024, 1, 8, 10)));
    }

    #[test]
    fn occurrences_include_overlapping_singular_events() {
        let event = Event::new(
            "single",
            "Single",
            EventTime::DateTimeFloating(naive(2024, 1, 1, 23)),
            EventTime::DateTimeFloating(naive(2024, 1, 2, 1)),
        );
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let found = expander.occurrences_between(&[event], &index, &utc(2024, 1, 2, 0), &utc(2024, 1, 3, 0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_id(), "single");
    }

    #[test]
    fn daily_buckets_span_days() {
        let expander = expander();
        let all_day = Event::new(
            "trip",
            "Trip",
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()),
        );
        let late = Event::new(
            "late",
            "Late",
            EventTime::DateTimeFloating(naive(2024, 1, 2, 22)),
            EventTime::DateTimeFloating(naive(2024, 1, 3, 0)),
        );
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let occurrences = expander.occurrences_between(
            &[all_day, late],
            &index,
            &start_of_day(from, chrono_tz::UTC),
            &start_of_day(to, chrono_tz::UTC),
        );
        let buckets = expander.daily_buckets(&occurrences, from, to);

        let jan = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        assert_eq!(buckets.get(&jan(2)).unwrap(), &vec!["trip".to_string(), "late".to_string()]);
        assert_eq!(buckets.get(&jan(3)).unwrap(), &vec!["trip".to_string()]);
        assert!(!buckets.contains_key(&jan(4)));
        assert!(!buckets.contains_key(&jan(1)));
    }
}
