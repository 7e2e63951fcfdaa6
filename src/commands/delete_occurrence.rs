use std::path::Path;

use anyhow::Result;
use calrecur_core::{Expander, delete_occurrence, recurrence_id_string};
use owo_colors::OwoColorize;

use crate::calendar_file::CalendarFile;
use crate::commands::resolve_when;

/// Remove the occurrence at `at`. A detached occurrence is removed along
/// with its exception; the slot stays empty.
pub fn run(path: &Path, at: &str, uid: Option<&str>, expander: &Expander) -> Result<()> {
    let zone = expander.zone();
    let mut file = CalendarFile::open(path, zone)?;
    let index = file.select(uid)?;
    let at = resolve_when(Some(at), zone)?;
    let uid = file.events[index].uid.clone();

    if file.exceptions.remove(&uid, &at).is_some() {
        tracing::debug!(uid = %uid, at = %recurrence_id_string(&at), "removed detached occurrence");
    } else {
        delete_occurrence(expander, &mut file.events[index], &at)?;
    }
    file.save()?;

    println!(
        "{}",
        format!("  Deleted: {} ({})", file.events[index].summary, recurrence_id_string(&at)).red()
    );
    Ok(())
}
