//! Timescrubber - Headless Timeline Runner
//!
//! Loads a content file, places its opening plan and any requested
//! purchases on a timeline, then prints variable values over time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

use timescrubber::content::{load_content, load_content_file};
use timescrubber::core::error::Result;
use timescrubber::core::types::Time;
use timescrubber::timeline::{Origin, Timeline};

const DEMO_CONTENT: &str = include_str!("../data/demo.toml");
const MAX_ROWS: u64 = 100_000;

/// Headless timeline runner
#[derive(Parser, Debug)]
#[command(name = "timescrubber")]
#[command(about = "Replay a content file's timeline and print its variables over time")]
struct Args {
    /// Content file (TOML); the built-in demo when omitted
    #[arg(long)]
    content: Option<PathBuf>,

    /// Last time to print
    #[arg(long, default_value_t = 30.0)]
    until: f64,

    /// Time between printed rows
    #[arg(long, default_value_t = 5.0)]
    step: f64,

    /// Purchase an upgrade, as NAME@TIME (repeatable)
    #[arg(long = "buy", value_parser = parse_at)]
    purchases: Vec<(String, f64)>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn parse_at(s: &str) -> std::result::Result<(String, f64), String> {
    let (name, time) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("expected NAME@TIME, got {}", s))?;
    let time: f64 = time
        .parse()
        .map_err(|_| format!("invalid time in {}", s))?;
    Ok((name.to_string(), time))
}

#[derive(Serialize)]
struct Row {
    time: Time,
    values: BTreeMap<String, f64>,
    running: Vec<String>,
}

#[derive(Serialize)]
struct ScheduleEntry {
    time: Time,
    name: String,
    origin: String,
}

#[derive(Serialize)]
struct Report {
    rows: Vec<Row>,
    schedule: Vec<ScheduleEntry>,
    purchased: BTreeMap<String, bool>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timescrubber=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut content = match &args.content {
        Some(path) => load_content_file(path)?,
        None => load_content(DEMO_CONTENT)?,
    };

    let mut timeline =
        Timeline::new(content.initial.clone()).with_config(content.config.clone());

    for (name, at) in &content.plan {
        let activity = content.activity(name)?;
        let id = timeline.add_shared(activity, *at)?;
        tracing::info!(activity = %name, time = at, id = %id, "Planned");
    }

    for (name, at) in &args.purchases {
        match content.upgrades.purchase_at(name, &mut timeline, *at) {
            Ok(_) => tracing::info!(upgrade = %name, time = at, "Purchased"),
            Err(err) => tracing::warn!(upgrade = %name, time = at, error = %err, "Purchase failed"),
        }
    }

    let epoch = timeline.epoch();
    let times = sample_times(epoch, args.until, args.step);

    timeline.set_max_time(args.until.max(epoch))?;
    let rows: Vec<Row> = timeline
        .sample(&times)?
        .into_iter()
        .map(|state| Row {
            time: state.time(),
            values: state
                .registry()
                .iter()
                .map(|v| (v.name().to_string(), v.get(state.time())))
                .collect(),
            running: state
                .active_processes()
                .iter()
                .map(|p| p.name.clone())
                .collect(),
        })
        .collect();

    let schedule: Vec<ScheduleEntry> = timeline
        .events()
        .iter()
        .filter(|e| e.time() <= args.until)
        .map(|e| ScheduleEntry {
            time: e.time(),
            name: e.event.name().to_string(),
            origin: match e.origin {
                Origin::External => "external".to_string(),
                Origin::Effect { parent, .. } => format!("effect of {}", parent),
                Origin::End { process, reason } => format!("{} end of {}", reason, process),
            },
        })
        .collect();

    let report = Report {
        rows,
        schedule,
        purchased: content.upgrades.purchase_state(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }

    Ok(())
}

/// Row times from `epoch` through `until`, `step` apart
///
/// Non-positive or non-finite steps fall back to 1, and the row count is
/// capped at `MAX_ROWS`.
fn sample_times(epoch: Time, until: Time, step: Time) -> Vec<Time> {
    let step = if step.is_finite() && step > 0.0 { step } else { 1.0 };
    if until.is_nan() || until < epoch {
        return Vec::new();
    }
    let rows = (((until - epoch) / step).floor() as u64).min(MAX_ROWS - 1) + 1;
    (0..rows)
        .map(|i| epoch + i as f64 * step)
        .take_while(|t| *t <= until)
        .collect()
}

fn print_table(report: &Report) {
    let Some(first) = report.rows.first() else {
        println!("No rows in range");
        return;
    };
    let names: Vec<&String> = first.values.keys().collect();

    print!("{:>8}", "time");
    for name in &names {
        print!(" {:>12}", name);
    }
    println!("  running");
    for row in &report.rows {
        print!("{:>8.2}", row.time);
        for name in &names {
            match row.values.get(*name) {
                Some(value) => print!(" {:>12.3}", value),
                None => print!(" {:>12}", "-"),
            }
        }
        println!("  {}", row.running.join(", "));
    }

    println!();
    println!("=== SCHEDULE ===");
    for entry in &report.schedule {
        println!("{:>8.2}  {:<28} {}", entry.time, entry.name, entry.origin);
    }

    let bought: Vec<&str> = report
        .purchased
        .iter()
        .filter(|(_, purchased)| **purchased)
        .map(|(name, _)| name.as_str())
        .collect();
    if !bought.is_empty() {
        println!();
        println!("Purchased: {}", bought.join(", "));
    }
}
