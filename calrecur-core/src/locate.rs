//! Finding the occurrence of an event nearest to a point in time.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::CoreResult;
use crate::event::{recurrence_id_string, Event};
use crate::exception::ExceptionIndex;
use crate::recurrence::Expander;

/// One concrete occurrence. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub event_uid: String,
    /// Start the occurrence has without exceptions; `None` for singular events
    pub recurrence_id: Option<DateTime<Tz>>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub all_day: bool,
    /// Supplied by a detached exception instance
    pub detached: bool,
}

impl Occurrence {
    /// The singular event itself, or an exception instance on its own.
    pub(crate) fn own(event: &Event, zone: Tz) -> Self {
        let start = event.start.resolve(zone);
        Occurrence {
            event_uid: event.uid.clone(),
            recurrence_id: event.recurrence_id.as_ref().map(|rid| rid.resolve(zone)),
            end: event.end_for(&start, zone),
            start,
            all_day: event.is_all_day(),
            detached: event.is_exception(),
        }
    }

    /// Series slot `slot`, lasting the series duration.
    pub(crate) fn computed(master: &Event, slot: DateTime<Tz>, zone: Tz) -> Self {
        if !master.recurs() {
            return Occurrence::own(master, zone);
        }
        Occurrence {
            event_uid: master.uid.clone(),
            recurrence_id: Some(slot),
            end: master.end_for(&slot, zone),
            start: slot,
            all_day: master.is_all_day(),
            detached: false,
        }
    }

    /// Series slot `slot`, replaced by `instance`.
    pub(crate) fn detached(instance: &Event, slot: DateTime<Tz>, zone: Tz) -> Self {
        Occurrence {
            recurrence_id: Some(slot),
            ..Occurrence::own(instance, zone)
        }
    }

    /// `uid`, or `uid-<recurrence id>` for an occurrence of a series.
    pub fn instance_id(&self) -> String {
        match &self.recurrence_id {
            Some(rid) => format!("{}-{}", self.event_uid, recurrence_id_string(rid)),
            None => self.event_uid.clone(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Zero-length occurrences overlap when they start inside the range.
    pub(crate) fn overlaps(&self, from: &DateTime<Tz>, to: &DateTime<Tz>) -> bool {
        if self.end > self.start {
            self.start <= *to && self.end > *from
        } else {
            self.start >= *from && self.start <= *to
        }
    }
}

/// Locates occurrences of events, honoring detached exceptions.
#[derive(Debug, Clone, Copy)]
pub struct Locator<'a> {
    expander: &'a Expander,
    exceptions: &'a ExceptionIndex,
}

impl<'a> Locator<'a> {
    pub fn new(expander: &'a Expander, exceptions: &'a ExceptionIndex) -> Self {
        Locator { expander, exceptions }
    }

    /// The occurrence of `event` at `target`, or the nearest one.
    ///
    /// Singular events and exception instances are their own occurrence.
    /// Without a target a series yields its first (defining) occurrence.
    /// Otherwise the occurrence starting at `target` wins, then the first
    /// one after it, then the last one before it. Excluded slots are passed
    /// over unless an exception fills them, in which case the exception's
    /// own start and end are returned.
    ///
    /// Returns `None` when nothing is found within the search horizon or the
    /// recurrence cannot be expanded.
    pub fn locate(&self, event: &Event, target: Option<&DateTime<Tz>>) -> Option<Occurrence> {
        let zone = self.expander.zone();
        if !event.recurs() || event.is_exception() {
            return Some(Occurrence::own(event, zone));
        }
        let Some(target) = target else {
            let start = event.start.resolve(zone);
            return Some(Occurrence::computed(event, start, zone));
        };
        let target = target.with_timezone(&zone);

        let matched = match self.nearest_slot(event, &target) {
            Ok(matched) => matched?,
            Err(e) => {
                tracing::debug!(uid = %event.uid, error = %e, "no occurrence, recurrence did not expand");
                return None;
            }
        };
        Some(match self.exceptions.get(&event.uid, &matched) {
            Some(instance) => Occurrence::detached(instance, matched, zone),
            None => Occurrence::computed(event, matched, zone),
        })
    }

    fn nearest_slot(&self, event: &Event, target: &DateTime<Tz>) -> CoreResult<Option<DateTime<Tz>>> {
        let horizon = self.expander.horizon();

        if let Some(slot) = self.expander.first_matching(event, target, |slot| self.is_live(event, slot))? {
            return Ok(Some(slot));
        }

        // Nothing ahead: walk back from the target until a live slot turns up.
        let mut before = *target;
        loop {
            let Some(slot) = self.expander.last_before(event, &before)? else {
                tracing::debug!(uid = %event.uid, target = %target, "no occurrence within search horizon");
                return Ok(None);
            };
            if self.is_live(event, &slot) {
                return Ok(Some(slot));
            }
            if *target - slot > horizon {
                return Ok(None);
            }
            before = slot;
        }
    }

    /// A slot counts unless an EXDATE removed it and no exception fills it.
    fn is_live(&self, event: &Event, slot: &DateTime<Tz>) -> bool {
        self.exceptions.get(&event.uid, slot).is_some() || !self.expander.is_excluded(event, slot)
    }

    /// Exceptions of `master` whose recurrence id the series no longer
    /// generates. They never show up in located or expanded occurrences.
    pub fn stranded(&self, master: &Event) -> Vec<&'a Event> {
        let zone = self.expander.zone();
        let stranded: Vec<&'a Event> = self
            .exceptions
            .for_series(&master.uid)
            .into_iter()
            .filter(|instance| {
                let Some(rid) = &instance.recurrence_id else {
                    return false;
                };
                let slot = rid.resolve(zone);
                !matches!(self.expander.recurs_at(master, &slot), Ok(true))
            })
            .collect();
        for instance in &stranded {
            tracing::debug!(
                uid = %instance.uid,
                recurrence_id = ?instance.recurrence_id,
                "stranded exception"
            );
        }
        stranded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use crate::exception::detach;
    use crate::rule::Recurrence;
    use chrono::{NaiveDate, NaiveDateTime};

    fn naive(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn at(d: u32, h: u32) -> DateTime<Tz> {
        EventTime::DateTimeFloating(naive(2024, 1, d, h)).resolve(chrono_tz::UTC)
    }

    fn weekly(rule: &str) -> Event {
        let mut event = Event::new(
            "standup",
            "Standup",
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
    fn exact_then_following_then_preceding() {
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let locator = Locator::new(&expander, &index);

        let event = weekly("FREQ=WEEKLY");
        assert_eq!(locator.locate(&event, Some(&at(8, 10))).unwrap().start, at(8, 10));
        assert_eq!(locator.locate(&event, Some(&at(9, 10))).unwrap().start, at(15, 10));

        let ended = weekly("FREQ=WEEKLY;UNTIL=20240114T235959");
        assert_eq!(locator.locate(&ended, Some(&at(9, 10))).unwrap().start, at(8, 10));
    }

    #[test]
    fn duration_is_preserved() {
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let locator = Locator::new(&expander, &index);
        let event = weekly("FREQ=WEEKLY");
        for target in [at(2, 0), at(9, 10), at(20, 23), at(31, 12)] {
            let occurrence = locator.locate(&event, Some(&target)).unwrap();
            assert_eq!(occurrence.duration(), Duration::hours(1));
        }
    }

    #[test]
    fn without_target_returns_nominal_occurrence() {
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let occurrence = Locator::new(&expander, &index)
            .locate(&weekly("FREQ=WEEKLY"), None)
            .unwrap();
        assert_eq!(occurrence.start, at(1, 10));
        assert_eq!(occurrence.end, at(1, 11));
        assert_eq!(occurrence.recurrence_id, Some(at(1, 10)));
    }

    #[test]
    fn singular_event_ignores_target() {
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let event = Event::new(
            "single",
            "Single",
            EventTime::DateTimeFloating(naive(2024, 1, 1, 10)),
            EventTime::DateTimeFloating(naive(2024, 1, 1, 12)),
        );
        let occurrence = Locator::new(&expander, &index)
            .locate(&event, Some(&at(20, 0)))
            .unwrap();
        assert_eq!(occurrence.start, at(1, 10));
        assert_eq!(occurrence.end, at(1, 12));
        assert_eq!(occurrence.instance_id(), "single");
    }

    #[test]
    fn detached_instance_takes_precedence() {
        let expander = expander();
        let mut master = weekly("FREQ=WEEKLY");
        let mut instance = detach(&expander, &mut master, &at(8, 10)).unwrap();
        instance.start = EventTime::DateTimeFloating(naive(2024, 1, 8, 11));
        instance.end = EventTime::DateTimeFloating(naive(2024, 1, 8, 12));
        let mut index = ExceptionIndex::new(chrono_tz::UTC);
        index.insert(instance.clone()).unwrap();

        let locator = Locator::new(&expander, &index);
        let occurrence = locator.locate(&master, Some(&at(8, 10))).unwrap();
        assert_eq!(occurrence.start, at(8, 11));
        assert_eq!(occurrence.end, at(8, 12));
        assert!(occurrence.detached);
        assert_eq!(occurrence.instance_id(), "standup-2024-01-08T10:00:00Z");

        // Located directly, the instance is its own occurrence.
        assert_eq!(locator.locate(&instance, Some(&at(30, 0))).unwrap().start, at(8, 11));
        assert!(locator.stranded(&master).is_empty());
    }

    #[test]
    fn moving_the_series_strands_exceptions() {
        let expander = expander();
        let mut master = weekly("FREQ=WEEKLY");
        let mut instance = detach(&expander, &mut master, &at(8, 10)).unwrap();
        instance.start = EventTime::DateTimeFloating(naive(2024, 1, 8, 11));
        instance.end = EventTime::DateTimeFloating(naive(2024, 1, 8, 12));
        let mut index = ExceptionIndex::new(chrono_tz::UTC);
        index.insert(instance).unwrap();

        master.start = EventTime::DateTimeFloating(naive(2024, 1, 1, 14));
        master.end = EventTime::DateTimeFloating(naive(2024, 1, 1, 15));

        let locator = Locator::new(&expander, &index);
        let occurrence = locator.locate(&master, Some(&at(8, 10))).unwrap();
        assert_eq!(occurrence.start, at(8, 14));
        assert!(!occurrence.detached);
        assert_eq!(locator.stranded(&master).len(), 1);
    }

    #[test]
    fn deleted_slots_are_skipped() {
        let expander = expander();
        let mut master = weekly("FREQ=WEEKLY");
        crate::exception::delete_occurrence(&expander, &mut master, &at(8, 10)).unwrap();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let locator = Locator::new(&expander, &index);
        assert_eq!(locator.locate(&master, Some(&at(8, 10))).unwrap().start, at(15, 10));

        let mut ended = weekly("FREQ=WEEKLY;COUNT=2");
        crate::exception::delete_occurrence(&expander, &mut ended, &at(8, 10)).unwrap();
        assert_eq!(locator.locate(&ended, Some(&at(20, 0))).unwrap().start, at(1, 10));
    }

    #[test]
    fn unexpandable_rule_locates_nothing() {
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let event = weekly("FREQ=WEEKLY;BYMONTHDAY=15");
        assert!(Locator::new(&expander, &index).locate(&event, Some(&at(8, 10))).is_none());
    }

    #[test]
    fn never_matching_rule_still_terminates() {
        let expander = expander();
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let event = weekly("FREQ=YEARLY;BYMONTH=2;BYMONTHDAY=30");
        let occurrence = Locator::new(&expander, &index).locate(&event, Some(&at(8, 10))).unwrap();
        assert_eq!(occurrence.start, at(1, 10));
        assert_eq!(occurrence.recurrence_id, Some(at(1, 10)));
    }

    #[test]
    fn finds_live_slot_past_instance_cap() {
        let expander = Expander::new(chrono_tz::UTC, Duration::days(3650), 10);
        let index = ExceptionIndex::new(chrono_tz::UTC);
        let mut event = weekly("FREQ=DAILY");
        if let Some(recurrence) = event.recurrence.as_mut() {
            for day in 5..=16 {
                recurrence.exdates.push(EventTime::DateTimeFloating(naive(2024, 1, day, 10)));
            }
        }
        let occurrence = Locator::new(&expander, &index).locate(&event, Some(&at(5, 10))).unwrap();
        assert_eq!(occurrence.start, at(17, 10));
    }

    #[test]
    fn all_day_series_in_zone() {
        let zone = chrono_tz::America::New_York;
        let expander = Expander::new(zone, Duration::days(3650), 10_000);
        let index = ExceptionIndex::new(zone);
        let mut event = Event::new(
            "bins",
            "Bins",
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
        );
        event.recurrence = Some(Recurrence::from_rule("FREQ=WEEKLY".parse().unwrap()));
        let target = EventTime::DateTimeFloating(naive(2024, 1, 4, 12)).resolve(zone);
        let occurrence = Locator::new(&expander, &index).locate(&event, Some(&target)).unwrap();
        assert!(occurrence.all_day);
        assert_eq!(occurrence.start.naive_local(), naive(2024, 1, 9, 0));
        assert_eq!(occurrence.end.naive_local(), naive(2024, 1, 10, 0));
    }
}
