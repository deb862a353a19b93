//! Output formatting module for CLI display
//!
//! Keeps terminal presentation apart from the replay itself.

use colored::Colorize;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use fundflow::ledger::LedgerAnomaly;
use fundflow::reports::FlowReport;
use fundflow::utils::{format_quantity, format_usd};

fn colored_usd(value: Decimal) -> String {
    if value > Decimal::ZERO {
        format_usd(value).green().to_string()
    } else if value < Decimal::ZERO {
        format_usd(value).red().to_string()
    } else {
        format_usd(value)
    }
}

/// Flow edges, optionally only those financing `symbol`
pub fn format_flows_table(report: &FlowReport, symbol: Option<&str>) -> String {
    #[derive(Tabled)]
    struct FlowRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "From")]
        from: String,
        #[tabled(rename = "To")]
        to: String,
        #[tabled(rename = "Type")]
        flow_type: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "USD")]
        value: String,
    }

    let rows: Vec<FlowRow> = report
        .edges
        .iter()
        .filter(|edge| symbol.map_or(true, |s| edge.symbol.eq_ignore_ascii_case(s)))
        .map(|edge| FlowRow {
            date: edge.date.format("%Y-%m-%d").to_string(),
            from: edge.from_symbol.clone(),
            to: edge.symbol.clone(),
            flow_type: edge.flow_type.to_string(),
            quantity: format_quantity(edge.quantity),
            price: format!("{:.2}", edge.price),
            value: format_usd(edge.value_usd),
        })
        .collect();

    if rows.is_empty() {
        return format!("{} No flows found\n", "ℹ".blue().bold());
    }

    let total: Decimal = report
        .edges
        .iter()
        .filter(|edge| symbol.map_or(true, |s| edge.symbol.eq_ignore_ascii_case(s)))
        .map(|edge| edge.value_usd)
        .sum();
    let count = rows.len();

    let mut output = format!("\n{} Fund Flows\n\n", "💸".cyan().bold());
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.modify(Columns::new(4..), Alignment::right());
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{:<20} {}\n{:<20} {}\n",
        "Edges:".bold(),
        count,
        "Total financed:".bold(),
        format_usd(total)
    ));
    output
}

/// Per-symbol summary table with portfolio totals
pub fn format_summary_table(report: &FlowReport) -> String {
    #[derive(Tabled)]
    struct SummaryRow {
        #[tabled(rename = "Symbol")]
        symbol: String,
        #[tabled(rename = "Ccy")]
        currency: String,
        #[tabled(rename = "Held")]
        held: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "If Held")]
        if_held: String,
        #[tabled(rename = "Sales")]
        sales: String,
        #[tabled(rename = "Dividends")]
        dividends: String,
        #[tabled(rename = "Missed Div.")]
        missed: String,
    }

    if report.summaries.is_empty() {
        return format_empty_report();
    }

    let rows: Vec<SummaryRow> = report
        .summaries
        .iter()
        .map(|s| SummaryRow {
            symbol: s.symbol.clone(),
            currency: s.currency.clone(),
            held: format_quantity(s.quantity_held),
            value: format_usd(s.current_value_usd),
            if_held: format_usd(s.if_held_value_usd),
            sales: format_usd(s.total_sales_usd),
            dividends: format_usd(s.dividends_received_usd),
            missed: format_usd(s.dividends_if_held_usd),
        })
        .collect();

    let mut output = format!("\n{} Portfolio Summary (USD)\n\n", "📊".cyan().bold());
    let mut table = Table::new(rows);
    table.with(Style::modern());
    // Right-align everything but Symbol and Ccy
    table.modify(Columns::new(2..), Alignment::right());
    output.push_str(&table.to_string());

    let totals = &report.totals;
    // Positive when sales plus current holdings beat keeping every share
    let outcome = totals.total_sales_usd + totals.current_value_usd - totals.if_held_value_usd;

    output.push_str(&format!("\n\n{} Totals", "━".repeat(80).bright_black()));
    output.push_str(&format!(
        "\n{:<24} {}",
        "Current Value:".bold(),
        format_usd(totals.current_value_usd)
    ));
    output.push_str(&format!(
        "\n{:<24} {}",
        "Value If Held:".bold(),
        format_usd(totals.if_held_value_usd)
    ));
    output.push_str(&format!(
        "\n{:<24} {}",
        "Total Sales:".bold(),
        format_usd(totals.total_sales_usd)
    ));
    output.push_str(&format!(
        "\n{:<24} {}",
        "Selling vs Holding:".bold(),
        colored_usd(outcome)
    ));
    output.push_str(&format!(
        "\n{:<24} {}",
        "Dividends Received:".bold(),
        format_usd(totals.dividends_received_usd)
    ));
    output.push_str(&format!(
        "\n{:<24} {}",
        "Dividends Missed:".bold(),
        format_usd(totals.dividends_if_held_usd)
    ));
    output.push_str(&format!(
        "\n{:<24} {}\n",
        "Unspent Funds:".bold(),
        format_usd(report.unspent_usd())
    ));

    output.push_str(&format_warnings(report));
    output
}

pub fn format_positions_table(report: &FlowReport) -> String {
    #[derive(Tabled)]
    struct PositionRow {
        #[tabled(rename = "Symbol")]
        symbol: String,
        #[tabled(rename = "Ccy")]
        currency: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Avg Cost")]
        average_cost: String,
        #[tabled(rename = "Cost Basis")]
        cost_basis: String,
    }

    if report.positions.is_empty() {
        return format_empty_report();
    }

    let rows: Vec<PositionRow> = report
        .positions
        .iter()
        .map(|p| PositionRow {
            symbol: p.symbol.clone(),
            currency: p.currency.clone(),
            quantity: format_quantity(p.quantity),
            average_cost: format!("{:.2}", p.average_cost()),
            cost_basis: format!("{:.2}", p.cost_basis),
        })
        .collect();

    let mut output = format!("\n{} Open Positions (native currency)\n\n", "📈".cyan().bold());
    let mut table = Table::new(rows);
    table.with(Style::modern());
    table.modify(Columns::new(2..), Alignment::right());
    output.push_str(&table.to_string());
    output.push('\n');
    output.push_str(&format_warnings(report));
    output
}

/// Anomalies and currency fallbacks worth the user's attention
pub fn format_warnings(report: &FlowReport) -> String {
    let mut output = String::new();

    for anomaly in &report.anomalies {
        match anomaly {
            LedgerAnomaly::Oversold {
                symbol,
                date,
                requested,
                held,
            } => output.push_str(&format!(
                "{} {} on {}: sold {} but only {} held\n",
                "⚠".yellow().bold(),
                symbol,
                date,
                format_quantity(*requested),
                format_quantity(*held)
            )),
        }
    }

    if !report.flagged_currencies.is_empty() {
        output.push_str(&format!(
            "{} No exchange rate for {}; amounts taken as USD\n",
            "⚠".yellow().bold(),
            report.flagged_currencies.join(", ")
        ));
    }

    output
}

pub fn format_empty_report() -> String {
    format!(
        "{} No transactions replayed\nPoint {} at a transactions CSV with --transactions <file>\n",
        "ℹ".blue().bold(),
        "fundflow".bold()
    )
}

/// Pretty JSON, falling back to an error object
pub fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}
