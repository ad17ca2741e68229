mod cli;
mod meter;
mod prelude;
mod quantity;
mod store;
mod tables;
mod tariff;
mod tracker;

use std::{
    io::BufRead,
    path::Path,
    time::SystemTime,
};

use chrono::Local;
use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command, StateArgs},
    meter::Meter,
    prelude::*,
    store::JsonFileStore,
    tables::{build_bill_table, build_cycles_table},
    tariff::{
        bill::compute_bill,
        rates::{ConfigurationError, RateTable},
    },
    tracker::{Ingestion, reading::parse_tick},
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let rates = RateTable::load(&args.rates_path);

    match args.command {
        Command::Bill(bill_args) => {
            let bill = compute_bill(&bill_args.usage(), &rates?);
            println!("{}", build_bill_table(&bill));
        }
        Command::Ingest(ingest_args) => {
            let (raw_import, raw_export) = ingest_args.readings();
            let mut meter = open_meter(rates, &ingest_args.state);
            let at = ingest_args.at.unwrap_or_else(Local::now);
            if let Some(ingestion) = meter.ingest(raw_import, raw_export, at) {
                log_ingestion(&ingestion);
            }
            show(&meter);
        }
        Command::Correct(correct_args) => {
            let mut meter = open_meter(rates, &correct_args.state);
            meter.set_energy_values(correct_args.correction())?;
            show(&meter);
        }
        Command::Show(state_args) => {
            show(&open_meter(rates, &state_args));
        }
        Command::Follow(state_args) => {
            let mut meter = open_meter(rates, &state_args);
            follow(&args.rates_path, &mut meter)?;
            show(&meter);
        }
    }

    info!("done!");
    Ok(())
}

fn open_meter(
    rates: Result<RateTable, ConfigurationError>,
    args: &StateArgs,
) -> Meter<JsonFileStore> {
    Meter::open(
        rates,
        JsonFileStore::new(args.state_path.clone()),
        args.billing_day,
        args.reset_ceiling,
        Local::now(),
    )
}

/// Apply the ticks from the standard input until it is closed.
#[instrument(skip_all, fields(rates_path = %rates_path.display()))]
fn follow(rates_path: &Path, meter: &mut Meter<JsonFileStore>) -> Result {
    let mut rates_modified_at = modified_at(rates_path);
    for line in std::io::stdin().lock().lines() {
        let line = line.context("failed to read the tick")?;
        let latest_modified_at = modified_at(rates_path);
        if latest_modified_at != rates_modified_at {
            rates_modified_at = latest_modified_at;
            meter.reload_rates(RateTable::load(rates_path));
        }
        let (raw_import, raw_export) = parse_tick(&line);
        if let Some(ingestion) = meter.ingest(raw_import, raw_export, Local::now()) {
            log_ingestion(&ingestion);
            if let Ok(bill) = meter.current_bill() {
                info!(consumed = %bill.consumed, total = %bill.final_bill, "running bill");
            }
        }
    }
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
}

fn log_ingestion(ingestion: &Ingestion) {
    info!(
        import = ?ingestion.import,
        export = ?ingestion.export,
        bucket = ?ingestion.bucket,
        n_rollovers = ingestion.n_rollovers,
        "tick applied",
    );
}

fn show(meter: &Meter<JsonFileStore>) {
    println!(
        "{}",
        build_cycles_table(
            meter.current_cycle_start(),
            meter.accumulators(),
            meter.nem_balance(),
            meter.previous_cycle(),
        )
    );
    if let Some(off_peak) = meter.unbilled_off_peak() {
        println!("Off-peak energy not billed on the standard tariff: {off_peak}");
    }
    if let Some(previous_bill) = meter.previous_bill() {
        match previous_bill {
            Ok(bill) => println!("Previous cycle:\n{}", build_bill_table(&bill)),
            Err(error) => println!("Previous cycle: unavailable: {error}"),
        }
    }
    match meter.current_bill() {
        Ok(bill) => println!("Current cycle:\n{}", build_bill_table(&bill)),
        Err(error) => println!("Current cycle: unavailable: {error}"),
    }
}
