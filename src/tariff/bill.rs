use crate::{
    quantity::{cost::Cost, energy::KilowattHours, rate::KilowattHourRate},
    tariff::{
        month::BillingMonth,
        rates::{AfaBasis, ExportOffset, RateTable, Tariff},
    },
};

/// Energy accumulated over a billing cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Usage {
    pub peak: KilowattHours,
    pub off_peak: KilowattHours,
    pub export: KilowattHours,

    /// Export carried over from the previous cycles of the year.
    pub nem_balance: KilowattHours,

    /// Selects the monthly fuel adjustment rate.
    pub month: Option<BillingMonth>,
}

impl Usage {
    pub const fn new(peak: KilowattHours, off_peak: KilowattHours, export: KilowattHours) -> Self {
        Self { peak, off_peak, export, nem_balance: KilowattHours::ZERO, month: None }
    }

    pub const fn with_month(mut self, month: BillingMonth) -> Self {
        self.month = Some(month);
        self
    }

    pub const fn with_nem_balance(mut self, nem_balance: KilowattHours) -> Self {
        self.nem_balance = nem_balance;
        self
    }
}

/// Itemised bill, recomputed on every evaluation.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BillBreakdown {
    /// Billable import.
    pub consumed: KilowattHours,

    pub energy_cost: Cost,

    /// Time-of-use only, zero on the standard tariff.
    pub peak_cost: Cost,

    /// Time-of-use only, zero on the standard tariff.
    pub off_peak_cost: Cost,

    pub capacity_charge: Cost,

    pub network_charge: Cost,

    pub retail_charge: Cost,

    /// Signed: negative for a rebate month.
    pub afa_adjustment: Cost,

    /// Zero or negative.
    pub eei_rebate: Cost,

    pub service_tax: Cost,

    pub kwtbb_charge: Cost,

    pub export_credit: Cost,

    pub subtotal: Cost,

    /// Subtotal floored at the minimum charge.
    pub final_bill: Cost,

    /// Tier containing the last consumed kilowatt-hour, `None` on time-of-use.
    pub current_tier: Option<usize>,

    /// Export credited in this bill, including the carried balance.
    pub credited_export: KilowattHours,

    /// Export beyond the billable import.
    pub excess_export: KilowattHours,
}

/// Price the accumulated energy.
///
/// The standard tariff bills `peak` alone because the tracker routes all its import there.
pub fn compute_bill(usage: &Usage, rates: &RateTable) -> BillBreakdown {
    let Usage { peak, off_peak, .. } = *usage;
    let consumed = rates.tariff().consumed(peak, off_peak);

    let (energy_cost, peak_cost, off_peak_cost, current_tier) = match rates.tariff() {
        Tariff::Standard(tiers) => {
            let (energy_cost, current_tier) = tiers.price(peak);
            (energy_cost, Cost::ZERO, Cost::ZERO, Some(current_tier))
        }
        Tariff::TimeOfUse { peak_rate, off_peak_rate, .. } => {
            let peak_cost = peak * *peak_rate;
            let off_peak_cost = off_peak * *off_peak_rate;
            (peak_cost + off_peak_cost, peak_cost, off_peak_cost, None)
        }
    };

    let charges = rates.charges();
    let capacity_charge = consumed * charges.capacity_rate;
    let network_charge = consumed * charges.network_rate;
    let retail_charge = if consumed > charges.retail_waiver { charges.retail } else { Cost::ZERO };

    let export = if rates.export().is_nem_carried_forward {
        usage.export + usage.nem_balance
    } else {
        usage.export
    };

    let afa = rates.afa();
    let afa_adjustment = if consumed > afa.waiver {
        let afa_base = match afa.basis {
            AfaBasis::Gross => consumed,
            AfaBasis::NetOfExport => (consumed - export).non_negative(),
        };
        afa_base * afa.rate(usage.month)
    } else {
        Cost::ZERO
    };

    let eei_rebate = rates
        .eei()
        .and_then(|eei| eei.rate(consumed))
        .map_or(Cost::ZERO, |rate| consumed * rate);

    let usage_charges = energy_cost + capacity_charge + network_charge + eei_rebate;

    let service_tax = {
        let taxable_base = usage_charges + retail_charge + afa_adjustment;
        let threshold = rates.service_tax().threshold;
        if consumed > threshold {
            let effective_rate: KilowattHourRate = (taxable_base / consumed).non_negative();
            (consumed - threshold) * effective_rate * rates.service_tax().rate
        } else {
            Cost::ZERO
        }
    };

    let kwtbb_charge = {
        let kwtbb = rates.kwtbb();
        let levied_base =
            if kwtbb.includes_afa { usage_charges + afa_adjustment } else { usage_charges };
        if consumed > kwtbb.threshold && levied_base > Cost::ZERO {
            levied_base * kwtbb.rate
        } else {
            Cost::ZERO
        }
    };

    let (export_credit, credited_export) =
        credit_export(export, peak, off_peak, current_tier, rates);

    let subtotal = usage_charges + retail_charge + afa_adjustment + service_tax + kwtbb_charge
        - export_credit;

    BillBreakdown {
        consumed,
        energy_cost,
        peak_cost,
        off_peak_cost,
        capacity_charge,
        network_charge,
        retail_charge,
        afa_adjustment,
        eei_rebate,
        service_tax,
        kwtbb_charge,
        export_credit,
        subtotal,
        final_bill: subtotal.max(rates.minimum_charge()),
        current_tier,
        credited_export,
        excess_export: (export - consumed).non_negative(),
    }
}

/// Returns the credit along with the credited export.
fn credit_export(
    export: KilowattHours,
    peak: KilowattHours,
    off_peak: KilowattHours,
    current_tier: Option<usize>,
    rates: &RateTable,
) -> (Cost, KilowattHours) {
    let policy = rates.export();
    let variable_rate = rates.charges().variable_rate();
    match (policy.offset, rates.tariff()) {
        (ExportOffset::Raw, Tariff::Standard(tiers)) => {
            let rate = policy.rate.unwrap_or_else(|| tiers.rate(current_tier.unwrap_or_default()));
            (export * rate, export)
        }
        (ExportOffset::Raw, Tariff::TimeOfUse { off_peak_rate, .. }) => {
            (export * policy.rate.unwrap_or(*off_peak_rate), export)
        }
        (ExportOffset::PeakFirst, Tariff::Standard(tiers)) => {
            let matched = export.min(peak);
            let rate = policy.rate.unwrap_or_else(|| tiers.rate(current_tier.unwrap_or_default()));
            (matched * (rate + variable_rate), matched)
        }
        (ExportOffset::PeakFirst, Tariff::TimeOfUse { peak_rate, off_peak_rate, .. }) => {
            let matched_peak = export.min(peak);
            let matched_off_peak = (export - matched_peak).min(off_peak);
            let credit = matched_peak * (policy.rate.unwrap_or(*peak_rate) + variable_rate)
                + matched_off_peak * (policy.rate.unwrap_or(*off_peak_rate) + variable_rate);
            (credit, matched_peak + matched_off_peak)
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{prelude::Result, tariff::rates::fixtures};

    const FLAT_40_SEN: &str =
        r#"{"type": "standard", "tiers": [{"threshold_kwh": 0, "rate": 0.4}]}"#;

    fn kwh(value: f64) -> KilowattHours {
        KilowattHours::from(value)
    }

    fn usage(peak: f64, off_peak: f64, export: f64) -> Usage {
        Usage::new(kwh(peak), kwh(off_peak), kwh(export))
    }

    fn rates_with(tariff: &str, extra: &str) -> RateTable {
        RateTable::from_json(&format!(
            r#"{{
                "tariff": {tariff},
                "service_tax": {{"percent": 8.0, "threshold_kwh": 600}},
                "kwtbb_percent": 1.6,
                "minimum_charge": 3.0,
                {extra}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn zero_consumption() {
        let bill = compute_bill(&usage(0.0, 0.0, 0.0), &fixtures::standard());
        assert_eq!(bill.energy_cost, Cost::ZERO);
        assert_eq!(bill.service_tax, Cost::ZERO);
        assert_eq!(bill.kwtbb_charge, Cost::ZERO);
        assert_eq!(bill.afa_adjustment, Cost::ZERO);
        assert_eq!(bill.export_credit, Cost::ZERO);
        assert_eq!(bill.subtotal, Cost::ZERO);
        assert_eq!(bill.final_bill, Cost::from(3.0));
        assert_eq!(bill.current_tier, Some(0));
    }

    #[test]
    fn zero_consumption_with_every_component() {
        let bill = compute_bill(&usage(0.0, 0.0, 0.0), &fixtures::tnb_time_of_use_2025());
        assert_eq!(bill.retail_charge, Cost::ZERO);
        assert_eq!(bill.subtotal, Cost::ZERO);
        assert_eq!(bill.final_bill, Cost::from(3.0));
    }

    #[test]
    fn single_tier() {
        let bill = compute_bill(&usage(123.0, 0.0, 0.0), &fixtures::single_tier(0.25));
        assert_abs_diff_eq!(bill.energy_cost.into_inner(), 123.0 * 0.25, epsilon = 1e-9);
        assert_eq!(bill.current_tier, Some(0));
    }

    #[test]
    fn tier_boundary() {
        let bill = compute_bill(&usage(250.0, 0.0, 0.0), &fixtures::standard());
        assert_abs_diff_eq!(bill.energy_cost.into_inner(), 200.0 * 0.2 + 50.0 * 0.3, epsilon = 1e-9);
        assert_eq!(bill.current_tier, Some(1));
    }

    #[test]
    fn standard_ignores_off_peak_bucket() {
        let bill = compute_bill(&usage(100.0, 50.0, 0.0), &fixtures::standard());
        assert_abs_diff_eq!(bill.consumed.into_inner(), 100.0);
        assert_eq!(bill.peak_cost, Cost::ZERO);
        assert_eq!(bill.off_peak_cost, Cost::ZERO);
    }

    #[test]
    fn no_service_tax_at_threshold() {
        let bill = compute_bill(&usage(600.0, 0.0, 0.0), &fixtures::standard());
        assert_eq!(bill.service_tax, Cost::ZERO);
    }

    #[test]
    fn service_tax_above_threshold() {
        let rates = rates_with(FLAT_40_SEN, r#""afa_rate_per_kwh": 0.0"#);
        let bill = compute_bill(&usage(650.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.service_tax.into_inner(), 50.0 * 0.4 * 0.08, epsilon = 1e-9);
    }

    #[test]
    fn service_tax_uses_blended_rate() {
        // 200 × 0.2 + 450 × 0.3 = 175 RM over 650 kWh.
        let bill = compute_bill(&usage(650.0, 0.0, 0.0), &fixtures::standard());
        let blended_rate = 175.0 / 650.0;
        assert_abs_diff_eq!(bill.service_tax.into_inner(), 50.0 * blended_rate * 0.08, epsilon = 1e-9);
    }

    #[test]
    fn time_of_use() {
        let bill = compute_bill(&usage(100.0, 200.0, 0.0), &fixtures::time_of_use());
        assert_abs_diff_eq!(bill.peak_cost.into_inner(), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.off_peak_cost.into_inner(), 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.energy_cost.into_inner(), 70.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.kwtbb_charge.into_inner(), 70.0 * 0.016, epsilon = 1e-9);
        assert_eq!(bill.current_tier, None);
    }

    #[test]
    fn afa_rebate_reduces_subtotal() {
        let rates = rates_with(FLAT_40_SEN, r#""afa_rate_per_kwh": -0.02"#);
        let bill = compute_bill(&usage(100.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.afa_adjustment.into_inner(), -2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.kwtbb_charge.into_inner(), 38.0 * 0.016, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.subtotal.into_inner(), 38.0 + 38.0 * 0.016, epsilon = 1e-9);
    }

    #[test]
    fn no_negative_kwtbb_on_net_rebate() {
        let rates = rates_with(
            r#"{"type": "standard", "tiers": [{"threshold_kwh": 0, "rate": 0.01}]}"#,
            r#""afa_rate_per_kwh": -0.05"#,
        );
        let bill = compute_bill(&usage(100.0, 0.0, 0.0), &rates);
        assert_eq!(bill.kwtbb_charge, Cost::ZERO);
        assert_eq!(bill.final_bill, Cost::from(3.0));
    }

    #[test]
    fn afa_net_of_export() {
        let rates =
            rates_with(FLAT_40_SEN, r#""afa_rate_per_kwh": 0.01, "afa_basis": "net_of_export""#);
        let bill = compute_bill(&usage(300.0, 0.0, 100.0), &rates);
        assert_abs_diff_eq!(bill.afa_adjustment.into_inner(), 2.0, epsilon = 1e-9);

        let bill = compute_bill(&usage(300.0, 0.0, 500.0), &rates);
        assert_eq!(bill.afa_adjustment, Cost::ZERO);
    }

    #[test]
    fn afa_monthly_rate() -> Result {
        let rates = rates_with(
            FLAT_40_SEN,
            r#""afa_rate_per_kwh": 0.01, "afa_rates": {"2025-01": -0.065, "2025-02": 0.02}"#,
        );
        let january = compute_bill(&usage(100.0, 0.0, 0.0).with_month("2025-01".parse()?), &rates);
        assert_abs_diff_eq!(january.afa_adjustment.into_inner(), -6.5, epsilon = 1e-9);

        let february = compute_bill(&usage(100.0, 0.0, 0.0).with_month("2025-02".parse()?), &rates);
        assert_abs_diff_eq!(february.afa_adjustment.into_inner(), 2.0, epsilon = 1e-9);

        // Unlisted month.
        let march = compute_bill(&usage(100.0, 0.0, 0.0).with_month("2025-03".parse()?), &rates);
        assert_abs_diff_eq!(march.afa_adjustment.into_inner(), 1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn afa_waived_at_limit() {
        let rates = rates_with(FLAT_40_SEN, r#""afa_rate_per_kwh": 0.02, "afa_waiver_kwh": 600"#);
        assert_eq!(compute_bill(&usage(600.0, 0.0, 0.0), &rates).afa_adjustment, Cost::ZERO);
        assert_abs_diff_eq!(
            compute_bill(&usage(601.0, 0.0, 0.0), &rates).afa_adjustment.into_inner(),
            601.0 * 0.02,
            epsilon = 1e-9,
        );
    }

    #[test]
    fn capacity_and_network_charges() {
        let rates = rates_with(
            FLAT_40_SEN,
            r#""charges": {"capacity_rate": 0.0455, "network_rate": 0.1285}"#,
        );
        let bill = compute_bill(&usage(100.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.capacity_charge.into_inner(), 4.55, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.network_charge.into_inner(), 12.85, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.kwtbb_charge.into_inner(), 57.4 * 0.016, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.subtotal.into_inner(), 57.4 * 1.016, epsilon = 1e-9);
    }

    #[test]
    fn retail_charge_waived_at_limit() {
        let rates = rates_with(FLAT_40_SEN, r#""charges": {"retail": 10.0}"#);
        assert_eq!(compute_bill(&usage(600.0, 0.0, 0.0), &rates).retail_charge, Cost::ZERO);
        assert_eq!(compute_bill(&usage(600.5, 0.0, 0.0), &rates).retail_charge, Cost::from(10.0));
    }

    #[test]
    fn eei_rebate_up_to_limit() {
        let rates = rates_with(
            FLAT_40_SEN,
            r#""eei": {"tiers": [{"up_to_kwh": 200, "rate": -0.25}, {"up_to_kwh": 1000, "rate": -0.005}]}"#,
        );
        let bill = compute_bill(&usage(150.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.eei_rebate.into_inner(), 150.0 * -0.25, epsilon = 1e-9);

        let bill = compute_bill(&usage(1000.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.eei_rebate.into_inner(), -5.0, epsilon = 1e-9);

        let bill = compute_bill(&usage(1001.0, 0.0, 0.0), &rates);
        assert_eq!(bill.eei_rebate, Cost::ZERO);
    }

    #[test]
    fn kwtbb_threshold() {
        let rates = rates_with(FLAT_40_SEN, r#""kwtbb_threshold_kwh": 300"#);
        assert_eq!(compute_bill(&usage(300.0, 0.0, 0.0), &rates).kwtbb_charge, Cost::ZERO);
        assert_abs_diff_eq!(
            compute_bill(&usage(301.0, 0.0, 0.0), &rates).kwtbb_charge.into_inner(),
            301.0 * 0.4 * 0.016,
            epsilon = 1e-9,
        );
    }

    #[test]
    fn kwtbb_excluding_afa() {
        let rates =
            rates_with(FLAT_40_SEN, r#""afa_rate_per_kwh": -0.02, "kwtbb_includes_afa": false"#);
        let bill = compute_bill(&usage(100.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.kwtbb_charge.into_inner(), 40.0 * 0.016, epsilon = 1e-9);
    }

    #[test]
    fn export_credit_at_off_peak_rate() {
        let bill = compute_bill(&usage(100.0, 100.0, 50.0), &fixtures::time_of_use());
        assert_abs_diff_eq!(bill.export_credit.into_inner(), 50.0 * 0.2, epsilon = 1e-9);
    }

    #[test]
    fn export_credit_at_current_tier_rate() {
        let bill = compute_bill(&usage(250.0, 0.0, 10.0), &fixtures::standard());
        assert_abs_diff_eq!(bill.export_credit.into_inner(), 10.0 * 0.3, epsilon = 1e-9);
    }

    #[test]
    fn export_rate_override() {
        let rates = rates_with(FLAT_40_SEN, r#""afa_rate_per_kwh": 0.0, "export_rate": 0.1"#);
        let bill = compute_bill(&usage(100.0, 0.0, 20.0), &rates);
        assert_abs_diff_eq!(bill.export_credit.into_inner(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn peak_first_offset() {
        let rates = rates_with(
            r#"{"type": "time_of_use", "peak_rate": 0.3, "off_peak_rate": 0.2}"#,
            r#""charges": {"capacity_rate": 0.04, "network_rate": 0.06}, "export_offset": "peak_first""#,
        );

        // Fits into peak.
        let bill = compute_bill(&usage(100.0, 200.0, 60.0), &rates);
        assert_abs_diff_eq!(bill.export_credit.into_inner(), 60.0 * 0.4, epsilon = 1e-9);

        // Spills over into off-peak.
        let bill = compute_bill(&usage(100.0, 200.0, 150.0), &rates);
        assert_abs_diff_eq!(
            bill.export_credit.into_inner(),
            100.0 * 0.4 + 50.0 * 0.3,
            epsilon = 1e-9,
        );
        assert_abs_diff_eq!(bill.credited_export.into_inner(), 150.0, epsilon = 1e-9);

        // Beyond the import.
        let bill = compute_bill(&usage(100.0, 200.0, 500.0), &rates);
        assert_abs_diff_eq!(
            bill.export_credit.into_inner(),
            100.0 * 0.4 + 200.0 * 0.3,
            epsilon = 1e-9,
        );
        assert_abs_diff_eq!(bill.credited_export.into_inner(), 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.excess_export.into_inner(), 200.0, epsilon = 1e-9);
    }

    #[test]
    fn peak_first_offset_on_standard() {
        let rates =
            rates_with(FLAT_40_SEN, r#""charges": {"network_rate": 0.1}, "export_offset": "peak_first""#);
        let bill = compute_bill(&usage(100.0, 0.0, 250.0), &rates);
        assert_abs_diff_eq!(bill.export_credit.into_inner(), 100.0 * 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.excess_export.into_inner(), 150.0, epsilon = 1e-9);
    }

    #[test]
    fn carried_nem_balance() {
        let rates =
            rates_with(FLAT_40_SEN, r#""export_offset": "peak_first", "nem_carry_forward": true"#);
        let bill = compute_bill(&usage(100.0, 0.0, 30.0).with_nem_balance(kwh(50.0)), &rates);
        assert_abs_diff_eq!(bill.credited_export.into_inner(), 80.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.export_credit.into_inner(), 80.0 * 0.4, epsilon = 1e-9);
    }

    #[test]
    fn nem_balance_ignored_unless_carried_forward() {
        let rates = rates_with(FLAT_40_SEN, r#""export_offset": "peak_first""#);
        let bill = compute_bill(&usage(100.0, 0.0, 30.0).with_nem_balance(kwh(50.0)), &rates);
        assert_abs_diff_eq!(bill.credited_export.into_inner(), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn export_never_drives_bill_below_minimum() {
        let bill = compute_bill(&usage(10.0, 5.0, 5000.0), &fixtures::time_of_use());
        assert!(bill.subtotal < Cost::ZERO);
        assert_eq!(bill.final_bill, Cost::from(3.0));
        assert_abs_diff_eq!(bill.excess_export.into_inner(), 4985.0, epsilon = 1e-9);
    }

    #[test]
    fn domestic_bill_with_rebate() {
        let rates = rates_with(
            r#"{
                "type": "standard",
                "tiers": [{"threshold_kwh": 0, "rate": 0.2703}, {"threshold_kwh": 1500, "rate": 0.3703}]
            }"#,
            r#""afa_rate_per_kwh": -0.01"#,
        );
        let bill = compute_bill(&usage(700.0, 0.0, 0.0), &rates);
        assert_abs_diff_eq!(bill.energy_cost.into_inner(), 189.21, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.afa_adjustment.into_inner(), -7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.service_tax.into_inner(), 100.0 * (182.21 / 700.0) * 0.08, epsilon = 1e-9);
        assert_abs_diff_eq!(bill.kwtbb_charge.into_inner(), 182.21 * 0.016, epsilon = 1e-9);
        assert_eq!(bill.final_bill.round_to_sen(), Cost::from(187.21));
        assert_eq!(bill.current_tier, Some(0));
    }

    /// Printed TNB bill for January 2025: 160 kWh peak and 798 kWh off-peak.
    #[test]
    fn tnb_bill_january_2025() -> Result {
        let usage = usage(160.0, 798.0, 0.0).with_month("2025-01".parse()?);
        let bill = compute_bill(&usage, &fixtures::tnb_time_of_use_2025());

        assert_abs_diff_eq!(bill.peak_cost.into_inner(), 45.63, epsilon = 0.01);
        assert_abs_diff_eq!(bill.off_peak_cost.into_inner(), 194.95, epsilon = 0.01);
        assert_abs_diff_eq!(bill.energy_cost.into_inner(), 240.58, epsilon = 0.01);
        assert_abs_diff_eq!(bill.capacity_charge.into_inner(), 43.59, epsilon = 0.01);
        assert_abs_diff_eq!(bill.network_charge.into_inner(), 123.10, epsilon = 0.01);
        assert_abs_diff_eq!(bill.afa_adjustment.into_inner(), -62.27, epsilon = 0.02);
        assert_eq!(bill.retail_charge, Cost::from(10.0));
        assert_abs_diff_eq!(bill.eei_rebate.into_inner(), -4.79, epsilon = 0.01);

        let base_bill = bill.energy_cost
            + bill.capacity_charge
            + bill.network_charge
            + bill.afa_adjustment
            + bill.retail_charge
            + bill.eei_rebate;
        assert_abs_diff_eq!(base_bill.into_inner(), 350.21, epsilon = 0.02);

        // Levied without the retail charge and the fuel adjustment.
        assert_abs_diff_eq!(bill.kwtbb_charge.into_inner(), 6.44, epsilon = 0.01);

        // The printed bill rounds its taxable portion differently.
        assert_abs_diff_eq!(bill.service_tax.into_inner(), 10.78, epsilon = 0.5);
        assert_abs_diff_eq!(bill.subtotal.into_inner(), 367.43, epsilon = 1.0);
        assert_eq!(bill.export_credit, Cost::ZERO);
        Ok(())
    }

    #[test]
    fn final_bill_never_below_minimum() {
        let all_rates = [
            fixtures::standard(),
            fixtures::time_of_use(),
            fixtures::single_tier(0.0),
            fixtures::tnb_time_of_use_2025(),
        ];
        for rates in all_rates {
            for peak in [0.0, 0.5, 150.0, 200.0, 601.0, 5000.0] {
                for off_peak in [0.0, 42.0, 900.0] {
                    for export in [0.0, 10.0, 10_000.0] {
                        let bill = compute_bill(&usage(peak, off_peak, export), &rates);
                        assert!(bill.final_bill >= rates.minimum_charge(), "{bill:?}");
                    }
                }
            }
        }
    }
}
