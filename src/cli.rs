use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

use crate::{
    quantity::energy::KilowattHours,
    tariff::{bill::Usage, month::BillingMonth},
    tracker::{Correction, cycle::BillingDay, reading::parse_reading},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// Rate table JSON.
    #[clap(long = "rates", env = "TNB_RATES_PATH", default_value = "rates.json")]
    pub rates_path: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Price explicit energy figures, without touching the saved state.
    #[clap(name = "bill")]
    Bill(BillArgs),

    /// Feed one tick of raw meter totals and print the running bill.
    #[clap(name = "ingest")]
    Ingest(Box<IngestArgs>),

    /// Overwrite the accumulated energy of the current cycle.
    #[clap(name = "correct")]
    Correct(Box<CorrectArgs>),

    /// Print the cycles and the running bill.
    #[clap(name = "show")]
    Show(StateArgs),

    /// Read `<import> [<export>]` ticks from the standard input, one per line.
    ///
    /// The rate table is reloaded whenever the file changes.
    #[clap(name = "follow")]
    Follow(StateArgs),
}

#[derive(Copy, Clone, Parser)]
pub struct BillArgs {
    #[clap(long = "peak", default_value = "0")]
    pub peak: KilowattHours,

    /// Ignored on the standard tariff.
    #[clap(long = "off-peak", default_value = "0")]
    pub off_peak: KilowattHours,

    #[clap(long = "export", default_value = "0")]
    pub export: KilowattHours,

    /// Export carried over from the earlier cycles of the year.
    #[clap(long = "nem-balance", default_value = "0")]
    pub nem_balance: KilowattHours,

    /// Month that selects the fuel adjustment rate, `YYYY-MM`.
    #[clap(long = "month")]
    pub month: Option<BillingMonth>,
}

impl BillArgs {
    pub fn usage(&self) -> Usage {
        let usage = Usage::new(self.peak, self.off_peak, self.export).with_nem_balance(self.nem_balance);
        match self.month {
            Some(month) => usage.with_month(month),
            None => usage,
        }
    }
}

#[derive(Parser)]
pub struct StateArgs {
    /// Tracker snapshot JSON.
    #[clap(long = "state", env = "TNB_STATE_PATH", default_value = "tnb-state.json")]
    pub state_path: PathBuf,

    /// Day of month on which the billing cycle starts.
    #[clap(long = "billing-day", env = "TNB_BILLING_DAY", default_value = "1")]
    pub billing_day: BillingDay,

    /// Meter decrease to a value above this is treated as a glitch rather than a counter reset.
    #[clap(long = "reset-ceiling-kwh", env = "TNB_RESET_CEILING_KWH")]
    pub reset_ceiling: Option<KilowattHours>,
}

#[derive(Parser)]
pub struct IngestArgs {
    /// Raw cumulative import state, as reported by the host.
    #[clap(long = "import")]
    pub import: String,

    /// Raw cumulative export state, as reported by the host.
    #[clap(long = "export")]
    pub export: Option<String>,

    /// Tick timestamp, defaults to now.
    #[clap(long = "at")]
    pub at: Option<DateTime<Local>>,

    #[clap(flatten)]
    pub state: StateArgs,
}

impl IngestArgs {
    #[must_use]
    pub fn readings(&self) -> (Option<KilowattHours>, Option<KilowattHours>) {
        (parse_reading(&self.import), self.export.as_deref().and_then(parse_reading))
    }
}

#[derive(Parser)]
pub struct CorrectArgs {
    #[clap(long = "peak")]
    pub peak: Option<KilowattHours>,

    #[clap(long = "off-peak")]
    pub off_peak: Option<KilowattHours>,

    #[clap(long = "export")]
    pub export: Option<KilowattHours>,

    /// Export carried over from the earlier cycles of the year.
    #[clap(long = "nem-balance")]
    pub nem_balance: Option<KilowattHours>,

    #[clap(flatten)]
    pub state: StateArgs,
}

impl CorrectArgs {
    pub const fn correction(&self) -> Correction {
        Correction {
            peak: self.peak,
            off_peak: self.off_peak,
            export: self.export,
            nem_balance: self.nem_balance,
        }
    }
}
