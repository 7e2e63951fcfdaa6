//! Recurrence handling for calendar events.
//!
//! - `category`: the ten editor-facing recurrence categories, classifying a
//!   rule into one and building a rule from one
//! - `recurrence`: instance expansion on top of the `rrule` crate
//! - `locate`: the occurrence nearest a point in time, honoring exceptions
//! - `exception`: detached instances and EXDATE bookkeeping
//! - `modification`: an edit buffer for events
//! - `ics`: reading and writing .ics files

pub mod category;
pub mod config;
pub mod error;
pub mod event;
pub mod exception;
pub mod ics;
pub mod locate;
pub mod modification;
pub mod recurrence;
pub mod rule;
pub mod time;
pub mod tracing;
pub mod weekday;

pub use category::{RecurrenceCategory, apply, classify, weekly_days};
pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventStatus, EventTime, Reminder, recurrence_id_string};
pub use exception::{ExceptionIndex, delete_occurrence, delete_series, detach};
pub use locate::{Locator, Occurrence};
pub use modification::{ChangeInformation, EventModification, TimeSpec};
pub use recurrence::Expander;
pub use rule::{Frequency, Recurrence, RecurrenceEnd, RecurrenceKind, RecurrenceRule, RuleParseError, WeekdayPosition};
pub use weekday::WeekdaySet;
