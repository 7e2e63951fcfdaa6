mod calendar_file;
mod commands;
mod render;
mod when;

use std::path::PathBuf;

use anyhow::{Context, Result};
use calrecur_core::tracing::{TracingConfig, init_tracing};
use calrecur_core::{Expander, RecurrenceCategory, Settings};
use clap::{Parser, Subcommand};

use crate::commands::detach::DetachOptions;
use crate::commands::set_recur::RecurOptions;

#[derive(Parser)]
#[command(name = "calrecur")]
#[command(about = "Inspect and edit recurring events in .ics files")]
struct Cli {
    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how each recurring event repeats
    Show { file: PathBuf },
    /// Show the occurrence of an event nearest to a time
    Next {
        file: PathBuf,

        /// Event to look at (defaults to the first recurring one)
        #[arg(long)]
        uid: Option<String>,

        /// Reference time, e.g. "tomorrow 3pm" (defaults to now)
        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// List occurrences of all events, grouped per day
    Occurrences {
        file: PathBuf,

        /// First day (defaults to today)
        #[arg(long)]
        from: Option<String>,

        /// Last day (defaults to a week from --from)
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Change how an event repeats
    SetRecur {
        file: PathBuf,

        /// once, daily, weekly, biweekly, weekly-by-days, monthly,
        /// monthly-by-day-of-week, monthly-by-last-day-of-week, yearly, custom
        category: RecurrenceCategory,

        #[arg(long)]
        uid: Option<String>,

        /// Weekdays for weekly-by-days (e.g. "MO,WE,FR")
        #[arg(long)]
        days: Option<String>,

        /// Last day of the series
        #[arg(long, conflicts_with = "forever")]
        until: Option<String>,

        /// Remove the end of the series
        #[arg(long)]
        forever: bool,
    },
    /// Split one occurrence off its series, optionally moving it
    Detach {
        file: PathBuf,

        /// Start of the occurrence to detach
        #[arg(long)]
        at: String,

        #[arg(long)]
        uid: Option<String>,

        /// New start time
        #[arg(short, long)]
        start: Option<String>,

        /// New duration (e.g. "30min", "2h")
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Delete one occurrence of a series
    DeleteOccurrence {
        file: PathBuf,

        /// Start of the occurrence to delete
        #[arg(long)]
        at: String,

        #[arg(long)]
        uid: Option<String>,
    },
    /// Delete a series together with its exceptions
    DeleteSeries {
        file: PathBuf,

        #[arg(long)]
        uid: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let tracing_config = if cli.verbose {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    init_tracing(tracing_config).context("Failed to set up logging")?;

    let settings = Settings::load().context("Failed to load settings")?;
    let expander = Expander::from_settings(&settings)?;
    tracing::debug!(zone = %expander.zone(), "loaded settings");

    match cli.command {
        Commands::Show { file } => commands::show::run(&file, &expander),
        Commands::Next { file, uid, at, json } => {
            commands::next::run(&file, uid.as_deref(), at.as_deref(), json, &expander)
        }
        Commands::Occurrences { file, from, to, json } => {
            commands::occurrences::run(&file, from.as_deref(), to.as_deref(), json, &expander)
        }
        Commands::SetRecur {
            file,
            category,
            uid,
            days,
            until,
            forever,
        } => {
            let options = RecurOptions {
                uid: uid.as_deref(),
                days: days.as_deref(),
                until: until.as_deref(),
                forever,
            };
            commands::set_recur::run(&file, category, options, &expander)
        }
        Commands::Detach {
            file,
            at,
            uid,
            start,
            duration,
        } => {
            let options = DetachOptions {
                at: &at,
                uid: uid.as_deref(),
                start: start.as_deref(),
                duration: duration.as_deref(),
            };
            commands::detach::run(&file, options, &expander)
        }
        Commands::DeleteOccurrence { file, at, uid } => {
            commands::delete_occurrence::run(&file, &at, uid.as_deref(), &expander)
        }
        Commands::DeleteSeries { file, uid } => commands::delete_series::run(&file, &uid, &expander),
    }
}
