pub mod cycle;
pub mod reading;

use chrono::{DateTime, Datelike, Local};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    prelude::*,
    quantity::{Quantity, energy::KilowattHours},
    tariff::rates::Tariff,
    tracker::cycle::{BillingDay, cycle_start_containing, next_cycle_start},
};

/// Restored accumulators above this are considered corrupt and clamped.
const MAX_RESTORED: KilowattHours = Quantity(OrderedFloat(100_000.0));

/// Import bucket.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bucket {
    Peak,
    OffPeak,
}

#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulators {
    #[serde(rename = "peak_kwh")]
    pub peak: KilowattHours,

    #[serde(rename = "off_peak_kwh")]
    pub off_peak: KilowattHours,

    #[serde(rename = "export_kwh")]
    pub export: KilowattHours,
}

fn sanitize(value: KilowattHours) -> KilowattHours {
    if value.is_finite() { value.clamp(KilowattHours::ZERO, MAX_RESTORED) } else { KilowattHours::ZERO }
}

impl Accumulators {
    fn sanitized(self) -> Self {
        Self { peak: sanitize(self.peak), off_peak: sanitize(self.off_peak), export: sanitize(self.export) }
    }
}

/// Cycle that has already rolled over.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedCycle {
    pub start: DateTime<Local>,

    /// Exclusive.
    pub end: DateTime<Local>,

    pub accumulators: Accumulators,

    /// Carried export that was available to this cycle.
    #[serde(default, rename = "nem_balance_kwh")]
    pub nem_balance: KilowattHours,
}

/// Tracker state preserved between the application runs.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergySnapshot {
    pub cycle_start: DateTime<Local>,

    pub billing_day: BillingDay,

    #[serde(rename = "accumulated")]
    pub accumulators: Accumulators,

    /// Last seen cumulative import, `None` until the first valid reading.
    #[serde(rename = "last_raw_import_kwh")]
    pub last_raw_import: Option<KilowattHours>,

    /// Last seen cumulative export, `None` until the first valid reading.
    #[serde(rename = "last_raw_export_kwh")]
    pub last_raw_export: Option<KilowattHours>,

    /// Export left over from the earlier cycles of the calendar year.
    #[serde(default, rename = "nem_balance_kwh")]
    pub nem_balance: KilowattHours,

    #[serde(default)]
    pub previous_cycle: Option<ClosedCycle>,
}

impl EnergySnapshot {
    pub fn new(billing_day: BillingDay, now: DateTime<Local>) -> Self {
        Self {
            cycle_start: cycle_start_containing(now, billing_day),
            billing_day,
            accumulators: Accumulators::default(),
            last_raw_import: None,
            last_raw_export: None,
            nem_balance: KilowattHours::ZERO,
            previous_cycle: None,
        }
    }
}

/// Manual correction of the current cycle, `None` fields stay untouched.
#[must_use]
#[derive(Copy, Clone, Debug, Default)]
pub struct Correction {
    pub peak: Option<KilowattHours>,
    pub off_peak: Option<KilowattHours>,
    pub export: Option<KilowattHours>,
    pub nem_balance: Option<KilowattHours>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum CorrectionError {
    #[error("`{field}` must be a finite non-negative number of kilowatt-hours, got {value:?}")]
    Invalid { field: &'static str, value: KilowattHours },

    #[error("the standard tariff has no off-peak energy to correct")]
    OffPeakOnStandard,
}

/// Outcome of an applied tick.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ingestion {
    pub import: KilowattHours,
    pub export: KilowattHours,
    pub bucket: Bucket,

    /// Number of billing cycle boundaries crossed on this tick.
    pub n_rollovers: usize,
}

/// Converts ever-increasing meter totals into per-cycle peak, off-peak, and export energy.
#[must_use]
pub struct EnergyTracker {
    snapshot: EnergySnapshot,

    /// Decrease to a raw value above this is a glitch rather than a counter reset.
    reset_ceiling: Option<KilowattHours>,
}

impl EnergyTracker {
    pub fn new(billing_day: BillingDay, now: DateTime<Local>) -> Self {
        info!(%billing_day, "starting a fresh tracker");
        Self { snapshot: EnergySnapshot::new(billing_day, now), reset_ceiling: None }
    }

    pub fn restore(mut snapshot: EnergySnapshot) -> Self {
        snapshot.accumulators = snapshot.accumulators.sanitized();
        snapshot.nem_balance = sanitize(snapshot.nem_balance);
        if let Some(previous_cycle) = &mut snapshot.previous_cycle {
            previous_cycle.accumulators = previous_cycle.accumulators.sanitized();
            previous_cycle.nem_balance = sanitize(previous_cycle.nem_balance);
        }
        info!(
            cycle_start = %snapshot.cycle_start,
            peak = ?snapshot.accumulators.peak,
            off_peak = ?snapshot.accumulators.off_peak,
            export = ?snapshot.accumulators.export,
            nem_balance = ?snapshot.nem_balance,
            "restored the tracker",
        );
        Self { snapshot, reset_ceiling: None }
    }

    pub const fn with_reset_ceiling(mut self, reset_ceiling: Option<KilowattHours>) -> Self {
        self.reset_ceiling = reset_ceiling;
        self
    }

    pub const fn snapshot(&self) -> &EnergySnapshot {
        &self.snapshot
    }

    pub const fn accumulators(&self) -> Accumulators {
        self.snapshot.accumulators
    }

    #[must_use]
    pub const fn cycle_start(&self) -> DateTime<Local> {
        self.snapshot.cycle_start
    }

    pub const fn nem_balance(&self) -> KilowattHours {
        self.snapshot.nem_balance
    }

    /// Change the billing day, the current cycle still closes on the new day of the next month.
    pub fn set_billing_day(&mut self, billing_day: BillingDay) {
        if billing_day != self.snapshot.billing_day {
            info!(from = %self.snapshot.billing_day, to = %billing_day, "billing day changed");
            self.snapshot.billing_day = billing_day;
        }
    }

    /// Apply one tick of raw meter totals.
    ///
    /// Returns `None` when neither reading is available: the tick is skipped and nothing changes.
    #[instrument(skip_all, fields(at = %at))]
    pub fn ingest(
        &mut self,
        raw_import: Option<KilowattHours>,
        raw_export: Option<KilowattHours>,
        at: DateTime<Local>,
        tariff: &Tariff,
    ) -> Option<Ingestion> {
        if raw_import.is_none() && raw_export.is_none() {
            warn!("no valid readings, skipping the tick");
            return None;
        }

        let n_rollovers = self.roll_over(at, tariff);

        let bucket = tariff.classify(at);
        let mut import = KilowattHours::ZERO;
        if let Some(raw_import) = raw_import {
            import = self.delta("import", self.snapshot.last_raw_import, raw_import);
            self.snapshot.last_raw_import = Some(raw_import);
            match bucket {
                Bucket::Peak => self.snapshot.accumulators.peak += import,
                Bucket::OffPeak => self.snapshot.accumulators.off_peak += import,
            }
        }

        let mut export = KilowattHours::ZERO;
        if let Some(raw_export) = raw_export {
            export = self.delta("export", self.snapshot.last_raw_export, raw_export);
            self.snapshot.last_raw_export = Some(raw_export);
            self.snapshot.accumulators.export += export;
        }

        debug!(?import, ?export, ?bucket, n_rollovers, "ingested");
        Some(Ingestion { import, export, bucket, n_rollovers })
    }

    /// Overwrite the named accumulators, validating all of them before touching any.
    ///
    /// Raw baselines are left alone, so the next tick still deltas from the real sensor.
    #[instrument(skip_all)]
    pub fn set_energy_values(&mut self, correction: Correction) -> Result<(), CorrectionError> {
        for (field, value) in [
            ("peak_kwh", correction.peak),
            ("off_peak_kwh", correction.off_peak),
            ("export_kwh", correction.export),
            ("nem_balance_kwh", correction.nem_balance),
        ] {
            if let Some(value) = value
                && !(value.is_finite() && value >= KilowattHours::ZERO)
            {
                return Err(CorrectionError::Invalid { field, value });
            }
        }

        let accumulators = &mut self.snapshot.accumulators;
        if let Some(peak) = correction.peak {
            accumulators.peak = peak;
        }
        if let Some(off_peak) = correction.off_peak {
            accumulators.off_peak = off_peak;
        }
        if let Some(export) = correction.export {
            accumulators.export = export;
        }
        if let Some(nem_balance) = correction.nem_balance {
            self.snapshot.nem_balance = nem_balance;
        }
        info!(
            peak = ?self.snapshot.accumulators.peak,
            off_peak = ?self.snapshot.accumulators.off_peak,
            export = ?self.snapshot.accumulators.export,
            nem_balance = ?self.snapshot.nem_balance,
            "manual correction applied",
        );
        Ok(())
    }

    /// Increment since the previous reading, absorbing counter resets.
    fn delta(
        &self,
        channel: &'static str,
        previous: Option<KilowattHours>,
        current: KilowattHours,
    ) -> KilowattHours {
        let Some(previous) = previous else {
            info!(channel, ?current, "first reading, establishing the baseline");
            return KilowattHours::ZERO;
        };
        if current >= previous {
            current - previous
        } else if self.reset_ceiling.is_some_and(|ceiling| current > ceiling) {
            warn!(channel, ?previous, ?current, "unexpected decrease, ignoring");
            KilowattHours::ZERO
        } else {
            info!(channel, ?previous, ?current, "counter reset detected");
            current
        }
    }

    /// Close every cycle whose boundary is at or before `at`.
    ///
    /// Export that the closed cycle did not consume is carried into the next one.
    /// The carried balance expires when a boundary starts a new calendar year.
    fn roll_over(&mut self, at: DateTime<Local>, tariff: &Tariff) -> usize {
        let mut n_rollovers = 0;
        loop {
            let boundary = next_cycle_start(self.snapshot.cycle_start, self.snapshot.billing_day);
            if at < boundary {
                break n_rollovers;
            }
            let closed = ClosedCycle {
                start: self.snapshot.cycle_start,
                end: boundary,
                accumulators: self.snapshot.accumulators,
                nem_balance: self.snapshot.nem_balance,
            };
            let consumed = tariff.consumed(closed.accumulators.peak, closed.accumulators.off_peak);
            let carried = (closed.accumulators.export + closed.nem_balance - consumed).non_negative();
            self.snapshot.nem_balance = if boundary.year() == closed.start.year() {
                carried
            } else {
                info!(expired = ?carried, "new calendar year, the carried export expires");
                KilowattHours::ZERO
            };
            info!(
                start = %closed.start,
                end = %closed.end,
                peak = ?closed.accumulators.peak,
                off_peak = ?closed.accumulators.off_peak,
                export = ?closed.accumulators.export,
                nem_balance = ?self.snapshot.nem_balance,
                "billing cycle closed",
            );
            self.snapshot.previous_cycle = Some(closed);
            self.snapshot.accumulators = Accumulators::default();
            self.snapshot.cycle_start = boundary;
            n_rollovers += 1;
        }
    }
}
