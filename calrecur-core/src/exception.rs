//! Detached exception instances.
//!
//! An exception overrides one occurrence of a series. It shares the series
//! uid and carries the start it replaces as its `recurrence_id`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, CoreResult};
use crate::event::{recurrence_id_string, Event, EventTime};
use crate::recurrence::Expander;

/// Exceptions keyed by `(series uid, recurrence-id instant)`.
#[derive(Debug, Clone)]
pub struct ExceptionIndex {
    zone: Tz,
    entries: BTreeMap<(String, DateTime<Utc>), Event>,
}

impl ExceptionIndex {
    /// `zone` resolves floating and all-day recurrence ids. Use the same
    /// zone as the [`Expander`].
    pub fn new(zone: Tz) -> Self {
        ExceptionIndex {
            zone,
            entries: BTreeMap::new(),
        }
    }

    /// Split a list of events into series/singular events and an index of
    /// their exceptions.
    pub fn partition(zone: Tz, events: Vec<Event>) -> (Vec<Event>, ExceptionIndex) {
        let mut index = ExceptionIndex::new(zone);
        let mut masters = Vec::new();
        for event in events {
            match &event.recurrence_id {
                Some(rid) => {
                    let key = (event.uid.clone(), rid.resolve(zone).with_timezone(&Utc));
                    index.entries.insert(key, event);
                }
                None => masters.push(event),
            }
        }
        (masters, index)
    }

    fn key(&self, uid: &str, instant: &DateTime<Tz>) -> (String, DateTime<Utc>) {
        (uid.to_string(), instant.with_timezone(&Utc))
    }

    /// Add an exception, returning the one it replaced.
    pub fn insert(&mut self, instance: Event) -> CoreResult<Option<Event>> {
        let rid = instance
            .recurrence_id
            .as_ref()
            .ok_or_else(|| CoreError::NotAnException(instance.uid.clone()))?
            .resolve(self.zone);
        let key = self.key(&instance.uid, &rid);
        Ok(self.entries.insert(key, instance))
    }

    pub fn get(&self, uid: &str, recurrence_id: &DateTime<Tz>) -> Option<&Event> {
        self.entries.get(&self.key(uid, recurrence_id))
    }

    /// Delete one exception. The slot it occupied stays excluded from the
    /// series for as long as its EXDATE remains on the master.
    pub fn remove(&mut self, uid: &str, recurrence_id: &DateTime<Tz>) -> Option<Event> {
        let key = self.key(uid, recurrence_id);
        self.entries.remove(&key)
    }

    pub fn for_series(&self, uid: &str) -> Vec<&Event> {
        self.entries
            .iter()
            .filter(|((series, _), _)| series == uid)
            .map(|(_, event)| event)
            .collect()
    }

    /// Remove and return every exception of a series.
    pub fn remove_series(&mut self, uid: &str) -> Vec<Event> {
        let keys: Vec<_> = self
            .entries
            .keys()
            .filter(|(series, _)| series == uid)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check that `at` is a live occurrence of `master`: generated by its
/// recurrence and not already excluded.
fn ensure_occurrence(expander: &Expander, master: &Event, at: &DateTime<Tz>) -> CoreResult<()> {
    if !master.recurs() {
        return Err(CoreError::NotRecurring(master.uid.clone()));
    }
    if !expander.recurs_at(master, at)? || expander.is_excluded(master, at) {
        return Err(CoreError::NotAnOccurrence {
            uid: master.uid.clone(),
            at: recurrence_id_string(at),
        });
    }
    Ok(())
}

fn exclude(master: &mut Event, at: &DateTime<Tz>) {
    let exdate = EventTime::like(&master.start, at);
    if let Some(recurrence) = master.recurrence.as_mut() {
        if !recurrence.exdates.contains(&exdate) {
            recurrence.exdates.push(exdate);
        }
    }
    master.bump_sequence();
}

/// Split the occurrence at `at` off `master` as a standalone instance.
///
/// The instance starts as a copy of the master at that slot. The master
/// gains an EXDATE for `at` and a new sequence number. There is no way back:
/// deleting the instance leaves the slot empty.
pub fn detach(expander: &Expander, master: &mut Event, at: &DateTime<Tz>) -> CoreResult<Event> {
    ensure_occurrence(expander, master, at)?;

    let zone = expander.zone();
    let mut instance = master.clone();
    instance.recurrence = None;
    instance.recurrence_id = Some(EventTime::like(&master.start, at));
    instance.start = EventTime::like(&master.start, at);
    instance.end = EventTime::like(&master.end, &master.end_for(at, zone));

    exclude(master, at);
    tracing::debug!(uid = %master.uid, at = %recurrence_id_string(at), "detached occurrence");
    Ok(instance)
}

/// Remove one occurrence from a series.
pub fn delete_occurrence(expander: &Expander, master: &mut Event, at: &DateTime<Tz>) -> CoreResult<()> {
    ensure_occurrence(expander, master, at)?;
    exclude(master, at);
    tracing::debug!(uid = %master.uid, at = %recurrence_id_string(at), "deleted occurrence");
    Ok(())
}

/// Drop every exception of a series. The caller drops the master itself.
pub fn delete_series(index: &mut ExceptionIndex, uid: &str) -> Vec<Event> {
    let removed = index.remove_series(uid);
    tracing::debug!(uid = %uid, exceptions = removed.len(), "deleted series");
    removed
}
