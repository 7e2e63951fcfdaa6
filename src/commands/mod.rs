pub mod delete_occurrence;
pub mod delete_series;
pub mod detach;
pub mod next;
pub mod occurrences;
pub mod set_recur;
pub mod show;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::when::parse_datetime;

/// Instant for a `--at` style argument, read in `zone`. Defaults to now.
pub fn resolve_when(input: Option<&str>, zone: Tz) -> Result<DateTime<Tz>> {
    match input {
        Some(input) => Ok(parse_datetime(input)?.resolve(zone)),
        None => Ok(Utc::now().with_timezone(&zone)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn resolves_in_zone() {
        let zone = chrono_tz::Europe::Helsinki;
        let at = resolve_when(Some("2024-01-08 10:00"), zone).unwrap();

        assert_eq!(at, zone.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap());
    }

    #[test]
    fn defaults_to_now() {
        let before = Utc::now();
        let at = resolve_when(None, Tz::UTC).unwrap();

        assert!(at >= before);
    }
}
