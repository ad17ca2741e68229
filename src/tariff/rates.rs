use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use enumset::EnumSet;
use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    prelude::*,
    quantity::{
        cost::Cost,
        energy::KilowattHours,
        percent::Percent,
        rate::KilowattHourRate,
    },
    tariff::{
        month::BillingMonth,
        schedule::{Day, PeakSchedule, PeakWindow},
    },
    tracker::Bucket,
};

/// Rate table cannot be used for billing until it is corrected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("failed to read `{path}`: {message}")]
    Read { path: String, message: String },

    #[error("malformed rate table: {0}")]
    Malformed(String),

    #[error("the standard tariff needs at least one tier")]
    NoTiers,

    #[error("the first tier must start at 0 kWh, not at {0} kWh")]
    FirstThreshold(f64),

    #[error("tier thresholds must strictly increase, got {previous} kWh followed by {next} kWh")]
    NonIncreasingThresholds { previous: f64, next: f64 },

    #[error("`{field}` must be a finite non-negative number, got {value}")]
    NegativeRate { field: &'static str, value: f64 },

    #[error("`{field}` must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("invalid peak window time `{0}`, expected `HH:MM`")]
    WindowTime(String),

    #[error("peak window {start}–{end} is empty")]
    EmptyWindow { start: NaiveTime, end: NaiveTime },

    #[error("billing day must be within 1–31, got `{0}`")]
    BillingDay(String),

    #[error("invalid month `{0}`, expected `YYYY-MM`")]
    Month(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TariffType {
    Standard,
    TimeOfUse,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    /// Lower bound of the tier, the first tier always starts at zero.
    pub threshold: KilowattHours,

    pub rate: KilowattHourRate,
}

/// Validated tier ladder: starts at zero, thresholds strictly increase, the last tier is unbounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tiers(Vec<Tier>);

impl Tiers {
    /// Walk the ladder and return the energy charge along with the tier of the last consumed kilowatt-hour.
    pub fn price(&self, consumed: KilowattHours) -> (Cost, usize) {
        let mut remaining = consumed;
        let mut cost = Cost::ZERO;
        let mut current_tier = 0;
        for (index, tier) in self.0.iter().enumerate() {
            if remaining <= KilowattHours::ZERO {
                break;
            }
            let charged = match self.0.get(index + 1) {
                Some(next) => remaining.min(next.threshold - tier.threshold),
                None => remaining,
            };
            cost += charged * tier.rate;
            remaining -= charged;
            current_tier = index;
        }
        (cost, current_tier)
    }

    /// Rate of the given tier, falling back to the top tier.
    pub fn rate(&self, index: usize) -> KilowattHourRate {
        self.0.get(index).or_else(|| self.0.last()).map_or(KilowattHourRate::ZERO, |tier| tier.rate)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tariff {
    Standard(Tiers),

    TimeOfUse {
        peak_rate: KilowattHourRate,
        off_peak_rate: KilowattHourRate,
        schedule: PeakSchedule,
    },
}

impl Tariff {
    #[must_use]
    pub const fn tariff_type(&self) -> TariffType {
        match self {
            Self::Standard(_) => TariffType::Standard,
            Self::TimeOfUse { .. } => TariffType::TimeOfUse,
        }
    }

    /// Pick the import bucket for energy consumed at the given moment.
    ///
    /// Tiers do not distinguish the time of day, so the standard tariff puts everything into peak.
    #[must_use]
    pub fn classify(&self, at: DateTime<Local>) -> Bucket {
        match self {
            Self::Standard(_) => Bucket::Peak,
            Self::TimeOfUse { schedule, .. } if schedule.is_peak(at) => Bucket::Peak,
            Self::TimeOfUse { .. } => Bucket::OffPeak,
        }
    }

    /// Billable import: the standard tariff only has the peak bucket.
    pub fn consumed(&self, peak: KilowattHours, off_peak: KilowattHours) -> KilowattHours {
        match self {
            Self::Standard(_) => peak,
            Self::TimeOfUse { .. } => peak + off_peak,
        }
    }
}

/// Per-kilowatt-hour and fixed charges billed on top of the energy charge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Charges {
    /// Generation capacity charge.
    pub capacity_rate: KilowattHourRate,

    /// Grid network charge.
    pub network_rate: KilowattHourRate,

    /// Flat monthly retail charge.
    pub retail: Cost,

    /// Retail charge is waived up to and including this consumption.
    pub retail_waiver: KilowattHours,
}

impl Default for Charges {
    fn default() -> Self {
        Self {
            capacity_rate: KilowattHourRate::ZERO,
            network_rate: KilowattHourRate::ZERO,
            retail: Cost::ZERO,
            retail_waiver: KilowattHours::from(600.0),
        }
    }
}

impl Charges {
    pub fn variable_rate(self) -> KilowattHourRate {
        self.capacity_rate + self.network_rate
    }
}

/// Consumption that the fuel adjustment is charged on.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfaBasis {
    /// All imported energy.
    #[default]
    Gross,

    /// Imported energy less the exported energy, never below zero.
    NetOfExport,
}

/// Automatic fuel adjustment, a surcharge or a rebate that changes monthly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuelAdjustment {
    /// Used for the months missing from `monthly`.
    pub fallback_rate: KilowattHourRate,

    pub monthly: BTreeMap<BillingMonth, KilowattHourRate>,

    /// No adjustment up to and including this consumption.
    pub waiver: KilowattHours,

    pub basis: AfaBasis,
}

impl FuelAdjustment {
    pub fn rate(&self, month: Option<BillingMonth>) -> KilowattHourRate {
        month.and_then(|month| self.monthly.get(&month).copied()).unwrap_or(self.fallback_rate)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EeiTier {
    /// Inclusive upper bound of the tier.
    pub up_to: KilowattHours,

    /// Negative for a rebate.
    pub rate: KilowattHourRate,
}

/// Energy efficiency incentive: a per-kilowatt-hour rebate for low-consumption households.
///
/// The whole consumption is priced at the rate of the first tier that covers it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EeiRebate {
    /// No incentive above this consumption.
    pub limit: KilowattHours,

    pub tiers: Vec<EeiTier>,

    /// Used when there are no tiers.
    pub flat_rate: KilowattHourRate,
}

impl EeiRebate {
    /// Rate that applies to the consumption, `None` above the limit.
    #[must_use]
    pub fn rate(&self, consumed: KilowattHours) -> Option<KilowattHourRate> {
        if consumed > self.limit {
            return None;
        }
        let rate = self
            .tiers
            .iter()
            .find(|tier| consumed <= tier.up_to)
            .or_else(|| self.tiers.last())
            .map_or(self.flat_rate, |tier| tier.rate);
        Some(rate)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServiceTax {
    pub rate: Percent,

    /// Only the consumption strictly above this is taxed.
    pub threshold: KilowattHours,
}

/// Renewable energy fund levy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Kwtbb {
    pub rate: Percent,

    /// Levied only when the consumption is strictly above this.
    pub threshold: KilowattHours,

    /// Whether the fuel adjustment is part of the levied base.
    pub includes_afa: bool,
}

/// How the export is matched against the import.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportOffset {
    /// All exported energy is credited at the export rate.
    #[default]
    Raw,

    /// Export offsets peak import first, then off-peak, each at its own energy and network rate.
    /// Anything beyond the import is not credited.
    PeakFirst,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportPolicy {
    /// Overrides the tariff-derived credit rate.
    pub rate: Option<KilowattHourRate>,

    pub offset: ExportOffset,

    /// Credit the export carried over from the previous cycles of the year.
    pub is_nem_carried_forward: bool,
}

/// Immutable tariff schedule, built only through validation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct RateTable {
    tariff: Tariff,
    charges: Charges,
    afa: FuelAdjustment,
    eei: Option<EeiRebate>,
    service_tax: ServiceTax,
    kwtbb: Kwtbb,
    minimum_charge: Cost,
    export: ExportPolicy,
}

impl RateTable {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        info!("loading the rate table…");
        let json = std::fs::read_to_string(path).map_err(|error| ConfigurationError::Read {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        let rates = Self::from_json(&json)?;
        info!(tariff_type = ?rates.tariff_type(), "loaded");
        Ok(rates)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str::<RawRateTable>(json)
            .map_err(|error| ConfigurationError::Malformed(error.to_string()))?
            .try_into()
    }

    pub const fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    #[must_use]
    pub const fn tariff_type(&self) -> TariffType {
        self.tariff.tariff_type()
    }

    pub const fn charges(&self) -> Charges {
        self.charges
    }

    pub const fn afa(&self) -> &FuelAdjustment {
        &self.afa
    }

    pub const fn eei(&self) -> Option<&EeiRebate> {
        self.eei.as_ref()
    }

    pub const fn service_tax(&self) -> ServiceTax {
        self.service_tax
    }

    pub const fn kwtbb(&self) -> Kwtbb {
        self.kwtbb
    }

    pub const fn minimum_charge(&self) -> Cost {
        self.minimum_charge
    }

    pub const fn export(&self) -> ExportPolicy {
        self.export
    }
}

#[derive(Deserialize)]
struct RawRateTable {
    tariff: RawTariff,

    #[serde(default)]
    charges: RawCharges,

    service_tax: RawServiceTax,

    kwtbb_percent: f64,

    #[serde(default)]
    kwtbb_threshold_kwh: f64,

    #[serde(default = "default_true")]
    kwtbb_includes_afa: bool,

    #[serde(default)]
    afa_rate_per_kwh: f64,

    #[serde(default)]
    afa_rates: BTreeMap<BillingMonth, f64>,

    #[serde(default)]
    afa_waiver_kwh: f64,

    #[serde(default)]
    afa_basis: AfaBasis,

    #[serde(default)]
    eei: Option<RawEei>,

    minimum_charge: f64,

    #[serde(default)]
    export_rate: Option<f64>,

    #[serde(default)]
    export_offset: ExportOffset,

    #[serde(default)]
    nem_carry_forward: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawTariff {
    Standard {
        tiers: Vec<RawTier>,
    },
    TimeOfUse {
        peak_rate: f64,
        off_peak_rate: f64,
        #[serde(default)]
        schedule: Option<RawSchedule>,
    },
}

#[derive(Deserialize)]
struct RawTier {
    threshold_kwh: f64,
    rate: f64,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawCharges {
    capacity_rate: f64,
    network_rate: f64,
    retail: f64,
    retail_waiver_kwh: f64,
}

impl Default for RawCharges {
    fn default() -> Self {
        Self { capacity_rate: 0.0, network_rate: 0.0, retail: 0.0, retail_waiver_kwh: 600.0 }
    }
}

#[derive(Deserialize)]
struct RawEei {
    #[serde(default = "RawEei::default_limit")]
    limit_kwh: f64,

    #[serde(default)]
    rate: f64,

    #[serde(default)]
    tiers: Vec<RawEeiTier>,
}

impl RawEei {
    const fn default_limit() -> f64 {
        1000.0
    }
}

#[derive(Deserialize)]
struct RawEeiTier {
    up_to_kwh: f64,
    rate: f64,
}

#[derive(Deserialize)]
struct RawServiceTax {
    percent: f64,
    #[serde(default = "RawServiceTax::default_threshold")]
    threshold_kwh: f64,
}

impl RawServiceTax {
    const fn default_threshold() -> f64 {
        600.0
    }
}

#[derive(Deserialize)]
struct RawSchedule {
    windows: Vec<RawWindow>,
    #[serde(default)]
    holidays: BTreeSet<NaiveDate>,
}

#[derive(Deserialize)]
struct RawWindow {
    days: Vec<Day>,
    start: String,
    end: String,
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ConfigurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigurationError::NegativeRate { field, value })
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, ConfigurationError> {
    if value.is_finite() { Ok(value) } else { Err(ConfigurationError::NotFinite { field, value }) }
}

fn strictly_increasing(
    thresholds: impl Iterator<Item = f64>,
) -> Result<(), ConfigurationError> {
    match thresholds.tuple_windows().find(|(previous, next)| next <= previous) {
        Some((previous, next)) => Err(ConfigurationError::NonIncreasingThresholds { previous, next }),
        None => Ok(()),
    }
}

fn parse_time(text: &str) -> Result<NaiveTime, ConfigurationError> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .map_err(|_| ConfigurationError::WindowTime(text.to_string()))
}

impl TryFrom<Vec<RawTier>> for Tiers {
    type Error = ConfigurationError;

    fn try_from(raw_tiers: Vec<RawTier>) -> Result<Self, Self::Error> {
        let first = raw_tiers.first().ok_or(ConfigurationError::NoTiers)?;
        if first.threshold_kwh != 0.0 {
            return Err(ConfigurationError::FirstThreshold(first.threshold_kwh));
        }
        strictly_increasing(raw_tiers.iter().map(|tier| tier.threshold_kwh))?;
        raw_tiers
            .into_iter()
            .map(|tier| {
                Ok(Tier {
                    threshold: KilowattHours::from(finite("threshold_kwh", tier.threshold_kwh)?),
                    rate: KilowattHourRate::from(non_negative("rate", tier.rate)?),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl TryFrom<RawWindow> for PeakWindow {
    type Error = ConfigurationError;

    fn try_from(raw_window: RawWindow) -> Result<Self, Self::Error> {
        let start = parse_time(&raw_window.start)?;
        let end = parse_time(&raw_window.end)?;
        let days: EnumSet<Day> = raw_window.days.into_iter().collect();
        if start == end || days.is_empty() {
            return Err(ConfigurationError::EmptyWindow { start, end });
        }
        Ok(Self { days, start, end })
    }
}

impl TryFrom<RawSchedule> for PeakSchedule {
    type Error = ConfigurationError;

    fn try_from(raw_schedule: RawSchedule) -> Result<Self, Self::Error> {
        Ok(Self {
            windows: raw_schedule
                .windows
                .into_iter()
                .map(PeakWindow::try_from)
                .collect::<Result<_, _>>()?,
            holidays: raw_schedule.holidays,
        })
    }
}

impl TryFrom<RawTariff> for Tariff {
    type Error = ConfigurationError;

    fn try_from(raw_tariff: RawTariff) -> Result<Self, Self::Error> {
        match raw_tariff {
            RawTariff::Standard { tiers } => Ok(Self::Standard(tiers.try_into()?)),
            RawTariff::TimeOfUse { peak_rate, off_peak_rate, schedule } => Ok(Self::TimeOfUse {
                peak_rate: non_negative("peak_rate", peak_rate)?.into(),
                off_peak_rate: non_negative("off_peak_rate", off_peak_rate)?.into(),
                schedule: schedule.map(PeakSchedule::try_from).transpose()?.unwrap_or_default(),
            }),
        }
    }
}

impl TryFrom<RawCharges> for Charges {
    type Error = ConfigurationError;

    fn try_from(raw: RawCharges) -> Result<Self, Self::Error> {
        Ok(Self {
            capacity_rate: non_negative("charges.capacity_rate", raw.capacity_rate)?.into(),
            network_rate: non_negative("charges.network_rate", raw.network_rate)?.into(),
            retail: non_negative("charges.retail", raw.retail)?.into(),
            retail_waiver: non_negative("charges.retail_waiver_kwh", raw.retail_waiver_kwh)?.into(),
        })
    }
}

impl TryFrom<RawEei> for EeiRebate {
    type Error = ConfigurationError;

    fn try_from(raw: RawEei) -> Result<Self, Self::Error> {
        strictly_increasing(raw.tiers.iter().map(|tier| tier.up_to_kwh))?;
        Ok(Self {
            limit: non_negative("eei.limit_kwh", raw.limit_kwh)?.into(),
            tiers: raw
                .tiers
                .into_iter()
                .map(|tier| {
                    Ok(EeiTier {
                        up_to: non_negative("eei.tiers.up_to_kwh", tier.up_to_kwh)?.into(),
                        rate: finite("eei.tiers.rate", tier.rate)?.into(),
                    })
                })
                .collect::<Result<_, ConfigurationError>>()?,
            flat_rate: finite("eei.rate", raw.rate)?.into(),
        })
    }
}

impl TryFrom<RawRateTable> for RateTable {
    type Error = ConfigurationError;

    fn try_from(raw: RawRateTable) -> Result<Self, Self::Error> {
        Ok(Self {
            tariff: raw.tariff.try_into()?,
            charges: raw.charges.try_into()?,
            afa: FuelAdjustment {
                fallback_rate: finite("afa_rate_per_kwh", raw.afa_rate_per_kwh)?.into(),
                monthly: raw
                    .afa_rates
                    .into_iter()
                    .map(|(month, rate)| Ok((month, KilowattHourRate::from(finite("afa_rates", rate)?))))
                    .collect::<Result<_, ConfigurationError>>()?,
                waiver: non_negative("afa_waiver_kwh", raw.afa_waiver_kwh)?.into(),
                basis: raw.afa_basis,
            },
            eei: raw.eei.map(EeiRebate::try_from).transpose()?,
            service_tax: ServiceTax {
                rate: non_negative("service_tax.percent", raw.service_tax.percent)?.into(),
                threshold: non_negative("service_tax.threshold_kwh", raw.service_tax.threshold_kwh)?
                    .into(),
            },
            kwtbb: Kwtbb {
                rate: non_negative("kwtbb_percent", raw.kwtbb_percent)?.into(),
                threshold: non_negative("kwtbb_threshold_kwh", raw.kwtbb_threshold_kwh)?.into(),
                includes_afa: raw.kwtbb_includes_afa,
            },
            minimum_charge: non_negative("minimum_charge", raw.minimum_charge)?.into(),
            export: ExportPolicy {
                rate: raw
                    .export_rate
                    .map(|rate| non_negative("export_rate", rate))
                    .transpose()?
                    .map(KilowattHourRate::from),
                offset: raw.export_offset,
                is_nem_carried_forward: raw.nem_carry_forward,
            },
        })
    }
}
