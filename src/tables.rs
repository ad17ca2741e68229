use chrono::{DateTime, Local};
use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    quantity::{cost::Cost, energy::KilowattHours},
    tariff::bill::BillBreakdown,
    tracker::{Accumulators, ClosedCycle},
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn cost_cell(cost: Cost) -> Cell {
    Cell::new(cost.round_to_sen()).set_alignment(CellAlignment::Right)
}

/// Charges are red, credits and rebates are green.
fn signed_cost_cell(cost: Cost) -> Cell {
    cost_cell(cost).fg(if cost >= Cost::ONE_SEN {
        Color::Red
    } else if cost <= -Cost::ONE_SEN {
        Color::Green
    } else {
        Color::Reset
    })
}

pub fn build_bill_table(bill: &BillBreakdown) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Item", "Amount"]);

    let mut consumed = Cell::new(bill.consumed).set_alignment(CellAlignment::Right);
    if let Some(current_tier) = bill.current_tier {
        consumed = Cell::new(format!("{} (tier {})", bill.consumed, current_tier + 1))
            .set_alignment(CellAlignment::Right);
    }
    table.add_row(vec![Cell::new("Consumed"), consumed]);
    if bill.excess_export > KilowattHours::ZERO {
        table.add_row(vec![
            Cell::new("Excess export").add_attribute(Attribute::Dim),
            Cell::new(bill.excess_export).set_alignment(CellAlignment::Right).fg(Color::Green),
        ]);
    }

    if bill.current_tier.is_none() {
        table.add_row(vec![Cell::new("Peak").add_attribute(Attribute::Dim), cost_cell(bill.peak_cost)]);
        table.add_row(vec![
            Cell::new("Off-peak").add_attribute(Attribute::Dim),
            cost_cell(bill.off_peak_cost),
        ]);
    }
    table.add_row(vec![Cell::new("Energy"), cost_cell(bill.energy_cost)]);
    for (item, cost) in [
        ("Capacity", bill.capacity_charge),
        ("Network", bill.network_charge),
        ("Retail", bill.retail_charge),
    ] {
        if cost != Cost::ZERO {
            table.add_row(vec![Cell::new(item), cost_cell(cost)]);
        }
    }
    table.add_row(vec![Cell::new("AFA"), signed_cost_cell(bill.afa_adjustment)]);
    if bill.eei_rebate != Cost::ZERO {
        table.add_row(vec![Cell::new("EEI"), signed_cost_cell(bill.eei_rebate)]);
    }
    table.add_row(vec![Cell::new("Service tax"), signed_cost_cell(bill.service_tax)]);
    table.add_row(vec![Cell::new("KWTBB"), signed_cost_cell(bill.kwtbb_charge)]);
    table.add_row(vec![
        Cell::new(format!("Export credit ({})", bill.credited_export)),
        signed_cost_cell(-bill.export_credit),
    ]);
    table.add_row(vec![Cell::new("Subtotal").add_attribute(Attribute::Dim), cost_cell(bill.subtotal)]);
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        cost_cell(bill.final_bill).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_cycles_table(
    current_start: DateTime<Local>,
    current: Accumulators,
    nem_balance: KilowattHours,
    previous: Option<ClosedCycle>,
) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Cycle", "Start", "End", "Peak", "Off-peak", "Export", "Carried"]);
    if let Some(previous) = previous {
        table.add_row(vec![
            Cell::new("Previous").add_attribute(Attribute::Dim),
            Cell::new(previous.start.format("%b %d")),
            Cell::new(previous.end.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(previous.accumulators.peak).set_alignment(CellAlignment::Right),
            Cell::new(previous.accumulators.off_peak).set_alignment(CellAlignment::Right),
            Cell::new(previous.accumulators.export).set_alignment(CellAlignment::Right),
            Cell::new(previous.nem_balance).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
        ]);
    }
    table.add_row(vec![
        Cell::new("Current").add_attribute(Attribute::Bold),
        Cell::new(current_start.format("%b %d")),
        Cell::new("…").add_attribute(Attribute::Dim),
        Cell::new(current.peak).set_alignment(CellAlignment::Right),
        Cell::new(current.off_peak).set_alignment(CellAlignment::Right),
        Cell::new(current.export).set_alignment(CellAlignment::Right),
        Cell::new(nem_balance).set_alignment(CellAlignment::Right).fg(Color::Green),
    ]);
    table
}
