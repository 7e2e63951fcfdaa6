//! Time zone helpers.

use chrono::{DateTime, Duration, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;

/// Look up an IANA zone name.
pub fn zone_named(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// Map a wall clock time in `zone` to an instant.
///
/// Ambiguous times (DST fall-back) take the earliest instant. Times inside a
/// DST gap move forward by the length of the gap.
pub fn local_to_instant(naive: NaiveDateTime, zone: Tz) -> DateTime<Tz> {
    if let Some(dt) = zone.from_local_datetime(&naive).earliest() {
        return dt;
    }
    // Inside a gap: read the wall clock with the offset in effect before it.
    let before = naive - Duration::hours(6);
    let offset = zone
        .from_local_datetime(&before)
        .earliest()
        .map(|dt| dt.offset().fix().local_minus_utc())
        .unwrap_or(0);
    zone.from_utc_datetime(&(naive - Duration::seconds(i64::from(offset))))
}
