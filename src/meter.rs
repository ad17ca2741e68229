use chrono::{DateTime, Local};

use crate::{
    prelude::*,
    quantity::energy::KilowattHours,
    store::SnapshotStore,
    tariff::{
        bill::{BillBreakdown, Usage, compute_bill},
        month::BillingMonth,
        rates::{ConfigurationError, RateTable, TariffType},
    },
    tracker::{
        Accumulators,
        ClosedCycle,
        Correction,
        CorrectionError,
        EnergyTracker,
        Ingestion,
        cycle::BillingDay,
    },
};

/// Billing core as seen by the host: rate table, tracker, and the persistence store.
///
/// Every mutation is followed by a save. A failed save is logged and the in-memory state stays
/// authoritative until the next successful one.
#[must_use]
pub struct Meter<S> {
    rates: Result<RateTable, ConfigurationError>,
    tracker: EnergyTracker,
    store: S,
}

impl<S: SnapshotStore> Meter<S> {
    /// Restore the tracker from the store, or start a fresh one on the very first run.
    ///
    /// An unreadable snapshot is logged and replaced by a fresh tracker.
    #[instrument(skip_all, fields(%billing_day))]
    pub fn open(
        rates: Result<RateTable, ConfigurationError>,
        mut store: S,
        billing_day: BillingDay,
        reset_ceiling: Option<KilowattHours>,
        now: DateTime<Local>,
    ) -> Self {
        if let Err(error) = &rates {
            error!("rate table is unusable, bills are unavailable: {error}");
        }
        let (mut tracker, is_fresh) = match store.load() {
            Ok(Some(snapshot)) => (EnergyTracker::restore(snapshot), false),
            Ok(None) => (EnergyTracker::new(billing_day, now), true),
            Err(error) => {
                error!("failed to load the snapshot, starting afresh: {error:#}");
                (EnergyTracker::new(billing_day, now), true)
            }
        };
        let is_billing_day_changed = tracker.snapshot().billing_day != billing_day;
        tracker.set_billing_day(billing_day);
        if is_fresh || is_billing_day_changed {
            Self::persist(&mut store, &tracker);
        }
        Self { rates, tracker: tracker.with_reset_ceiling(reset_ceiling), store }
    }

    /// Swap the rate table after a configuration change.
    pub fn reload_rates(&mut self, rates: Result<RateTable, ConfigurationError>) {
        match &rates {
            Ok(rates) => info!(tariff_type = ?rates.tariff_type(), "rate table reloaded"),
            Err(error) => error!("rate table is unusable, bills are unavailable: {error}"),
        }
        self.rates = rates;
        if let Some(off_peak) = self.unbilled_off_peak() {
            warn!(?off_peak, "the standard tariff does not bill the off-peak energy of this cycle");
        }
    }

    /// Off-peak energy of the current cycle that the standard tariff leaves out of the bill.
    ///
    /// It is kept, so switching back to time-of-use bills it again.
    #[must_use]
    pub fn unbilled_off_peak(&self) -> Option<KilowattHours> {
        let off_peak = self.tracker.accumulators().off_peak;
        let is_standard = self
            .rates
            .as_ref()
            .is_ok_and(|rates| rates.tariff_type() == TariffType::Standard);
        (is_standard && off_peak > KilowattHours::ZERO).then_some(off_peak)
    }

    /// Feed one tick of raw meter totals.
    ///
    /// The tick is skipped without moving the baselines while the rate table is unusable,
    /// so the consumption is picked up on the first tick after the correction.
    pub fn ingest(
        &mut self,
        raw_import: Option<KilowattHours>,
        raw_export: Option<KilowattHours>,
        at: DateTime<Local>,
    ) -> Option<Ingestion> {
        let Ok(rates) = &self.rates else {
            warn!("no usable rate table, skipping the tick");
            return None;
        };
        let ingestion = self.tracker.ingest(raw_import, raw_export, at, rates.tariff())?;
        Self::persist(&mut self.store, &self.tracker);
        Some(ingestion)
    }

    /// Apply a manual correction.
    ///
    /// Off-peak energy is rejected on the standard tariff, which would never bill it.
    pub fn set_energy_values(&mut self, correction: Correction) -> Result<(), CorrectionError> {
        if correction.off_peak.is_some()
            && let Ok(rates) = &self.rates
            && rates.tariff_type() == TariffType::Standard
        {
            return Err(CorrectionError::OffPeakOnStandard);
        }
        self.tracker.set_energy_values(correction)?;
        Self::persist(&mut self.store, &self.tracker);
        Ok(())
    }

    /// Bill for the current cycle so far, or the reason it cannot be computed.
    pub fn current_bill(&self) -> Result<BillBreakdown, ConfigurationError> {
        let rates = self.rates.as_ref().map_err(Clone::clone)?;
        let usage = Self::usage(
            self.tracker.accumulators(),
            self.tracker.nem_balance(),
            self.tracker.cycle_start(),
        );
        Ok(compute_bill(&usage, rates))
    }

    /// Bill for the last closed cycle, priced with the current rate table.
    pub fn previous_bill(&self) -> Option<Result<BillBreakdown, ConfigurationError>> {
        let previous = self.previous_cycle()?;
        let usage = Self::usage(previous.accumulators, previous.nem_balance, previous.start);
        Some(self.rates.as_ref().map_err(Clone::clone).map(|rates| compute_bill(&usage, rates)))
    }

    pub const fn accumulators(&self) -> Accumulators {
        self.tracker.accumulators()
    }

    pub const fn nem_balance(&self) -> KilowattHours {
        self.tracker.nem_balance()
    }

    #[must_use]
    pub const fn current_cycle_start(&self) -> DateTime<Local> {
        self.tracker.cycle_start()
    }

    #[must_use]
    pub const fn previous_cycle(&self) -> Option<ClosedCycle> {
        self.tracker.snapshot().previous_cycle
    }

    /// The fuel adjustment month is the month in which the cycle starts.
    fn usage(
        accumulators: Accumulators,
        nem_balance: KilowattHours,
        cycle_start: DateTime<Local>,
    ) -> Usage {
        Usage::new(accumulators.peak, accumulators.off_peak, accumulators.export)
            .with_nem_balance(nem_balance)
            .with_month(BillingMonth::of(cycle_start))
    }

    fn persist(store: &mut S, tracker: &EnergyTracker) {
        if let Err(error) = store.save(tracker.snapshot()) {
            error!("failed to save the snapshot: {error:#}");
        }
    }
}
