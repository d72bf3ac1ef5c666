//! Bank marketing funnel dashboard.
//!
//! Loads `bank.csv`, lets the user filter by contact channel and job type and
//! shows conversion KPIs and charts in the terminal. `--snapshot` prints the
//! same figures as JSON instead.

use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

use crate::app::Dashboard;
use crate::csv_reader::{TableCache, CSV_FILE_PATH};
use crate::dataset::FilterSelection;
use crate::report::DashboardReport;

mod aggregator;
mod app;
mod csv_reader;
mod dataset;
mod error;
mod report;
mod ui;

#[derive(Parser, Debug)]
#[command(name = "bank-dashboard", about = "Bank marketing funnel & conversion dashboard", version)]
struct Cli {
    /// Semicolon separated bank marketing file
    #[arg(short, long, env = "BANK_DASHBOARD_DATA", default_value = CSV_FILE_PATH)]
    data: PathBuf,

    /// Print the report as JSON and exit instead of opening the dashboard
    #[arg(long)]
    snapshot: bool,

    /// Contact channel to keep in the snapshot (repeatable, default all)
    #[arg(long = "contact", requires = "snapshot")]
    contacts: Vec<String>,

    /// Job type to keep in the snapshot (repeatable, default all)
    #[arg(long = "job", requires = "snapshot")]
    jobs: Vec<String>,

    /// Write logs to this file while the dashboard is open
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(cli: &Cli) -> Result<(), Box<dyn Error>> {
    // The dashboard owns the terminal, so logs only go to stderr in snapshot mode.
    let writer = match (&cli.log_file, cli.snapshot) {
        (Some(path), _) => BoxMakeWriter::new(Mutex::new(File::create(path)?)),
        (None, true) => BoxMakeWriter::new(std::io::stderr),
        (None, false) => BoxMakeWriter::new(std::io::sink),
    };
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

fn snapshot(cli: &Cli, mut cache: TableCache) -> Result<(), Box<dyn Error>> {
    let table = cache.get()?;
    let mut selection = FilterSelection::all(&table);
    if !cli.contacts.is_empty() {
        selection = selection.with_contacts(cli.contacts.iter().map(|c| c.to_lowercase()));
    }
    if !cli.jobs.is_empty() {
        selection = selection.with_jobs(cli.jobs.iter().map(|j| j.to_lowercase()));
    }
    let report = DashboardReport::build(&table, &selection);
    info!(rows = report.kpi.total, "snapshot built");
    println!("{}", report.to_json()?);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let cache = TableCache::new(&cli.data);
    if cli.snapshot {
        return snapshot(&cli, cache);
    }

    let dashboard = Dashboard::new(cache)?;
    ui::run(dashboard, ui::TICK_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_snapshot_filters() {
        let cli = Cli::try_parse_from([
            "bank-dashboard",
            "--data",
            "other.csv",
            "--snapshot",
            "--contact",
            "cellular",
            "--contact",
            "telephone",
            "--job",
            "admin.",
        ])
        .unwrap();
        assert_eq!(cli.data, PathBuf::from("other.csv"));
        assert!(cli.snapshot);
        assert_eq!(cli.contacts, vec!["cellular", "telephone"]);
        assert_eq!(cli.jobs, vec!["admin."]);
    }

    #[test]
    fn filters_need_snapshot_mode() {
        assert!(Cli::try_parse_from(["bank-dashboard", "--job", "admin."]).is_err());
    }

    #[test]
    fn snapshot_runs_against_a_file() {
        let file = app::tests::sample_file();
        let cli = Cli::try_parse_from([
            "bank-dashboard",
            "--snapshot",
            "--contact",
            "Cellular",
        ])
        .unwrap();
        snapshot(&cli, TableCache::new(file.path())).unwrap();
    }
}
