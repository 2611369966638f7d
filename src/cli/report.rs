use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};
use serde::Serialize;

use crate::aggregate::{
    aggregate_with, compare_kpis, prior_period_kpis, AggregateOptions, AggregateResult,
    CategorySpend, ContractBreakdown, FacilitySpend, KpiComparison, Kpis, MonthSpend, VendorShare, VendorSpend,
};
use crate::cli::{FilterArgs, Section, Session};
use crate::error::Result;
use crate::filter::{active_filter_count, apply_filters, FilterCriteria};
use crate::fmt::{delta, money, money_compact, pct, thousands};
use crate::models::ContractType;

const NO_DATA: &str = "No data matches the current filters.";

/// Everything one dashboard render needs, computed from the session.
struct Dashboard {
    period: String,
    active_filters: usize,
    result: AggregateResult,
    comparison: KpiComparison,
}

fn build(session: &Session, criteria: &FilterCriteria, options: &AggregateOptions) -> Dashboard {
    let filtered = apply_filters(&session.table, criteria);
    let result = aggregate_with(&filtered, options);
    let prior = prior_period_kpis(&session.table, criteria);
    let comparison = compare_kpis(&result.kpis, prior.as_ref());
    Dashboard {
        period: period_label(session, criteria),
        active_filters: active_filter_count(criteria, &session.table),
        result,
        comparison,
    }
}

fn period_label(session: &Session, criteria: &FilterCriteria) -> String {
    let bounds = session.table.date_bounds();
    let range = match (criteria.date_range(), bounds) {
        (Some(r), _) => Some((r.start(), r.end())),
        (None, b) => b,
    };
    match range {
        Some((start, end)) => format!("{} – {}", start.format("%b %Y"), end.format("%b %Y")),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SummaryJson<'a> {
    period: &'a str,
    active_filters: usize,
    comparison: &'a KpiComparison,
    #[serde(flatten)]
    result: &'a AggregateResult,
}

pub fn summary(data: Option<&str>, filters: &FilterArgs, json: bool) -> Result<()> {
    let session = Session::open(data)?;
    let criteria = session.criteria(filters)?;
    let dash = build(&session, &criteria, &session.settings.aggregate_options());

    if json {
        let out = SummaryJson {
            period: &dash.period,
            active_filters: dash.active_filters,
            comparison: &dash.comparison,
            result: &dash.result,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", format_summary(&dash, session.settings.ppi_warning_pct));
    }
    Ok(())
}

pub fn section(
    data: Option<&str>,
    section: Section,
    filters: &FilterArgs,
    json: bool,
    top: Option<usize>,
    threshold: Option<f64>,
) -> Result<()> {
    let session = Session::open(data)?;
    let criteria = session.criteria(filters)?;
    let mut options = session.settings.aggregate_options();
    if let Some(n) = top {
        options.top_n = n;
    }
    if let Some(t) = threshold {
        options.off_contract_threshold_pct = t;
    }
    let dash = build(&session, &criteria, &options);
    let r = &dash.result;

    let out = if json {
        match section {
            Section::Kpis => serde_json::to_string_pretty(&(&r.kpis, &dash.comparison))?,
            Section::Categories => serde_json::to_string_pretty(&r.spend_by_category)?,
            Section::Monthly => serde_json::to_string_pretty(&r.spend_by_month)?,
            Section::Vendors => serde_json::to_string_pretty(&r.spend_by_vendor_top_n)?,
            Section::Concentration => serde_json::to_string_pretty(&r.vendor_concentration)?,
            Section::Facilities => serde_json::to_string_pretty(&r.spend_by_facility)?,
            Section::Contracts => serde_json::to_string_pretty(&r.spend_by_contract_type)?,
            Section::Opportunities => serde_json::to_string_pretty(&r.spend_by_contract_type.opportunities)?,
        }
    } else {
        match section {
            Section::Kpis => format_kpis(&r.kpis, &dash.comparison, session.settings.ppi_warning_pct),
            Section::Categories => format_categories(&r.spend_by_category),
            Section::Monthly => format_monthly(&r.spend_by_month),
            Section::Vendors => format_vendors(&r.spend_by_vendor_top_n),
            Section::Concentration => format_concentration(&r.vendor_concentration),
            Section::Facilities => format_facilities(&r.spend_by_facility),
            Section::Contracts => format_contracts(&r.spend_by_contract_type),
            Section::Opportunities => format_opportunities(&r.spend_by_contract_type),
        }
    };
    println!("{out}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Pure formatting functions (aggregates → String)
// ---------------------------------------------------------------------------

fn right(text: impl ToString) -> Cell {
    Cell::new(text.to_string()).set_alignment(CellAlignment::Right)
}

fn format_summary(dash: &Dashboard, ppi_warning_pct: f64) -> String {
    let r = &dash.result;
    let mut out = String::from("Healthcare Procurement Spend Analytics\n");
    out.push_str(&format!(
        "Multi-facility spend analysis across {} | {} transactions\n",
        dash.period,
        thousands(r.kpis.transaction_count)
    ));
    if dash.active_filters > 0 {
        let s = if dash.active_filters == 1 { "" } else { "s" };
        out.push_str(&format!("{} filter{s} active\n", dash.active_filters).cyan().to_string());
    }
    out.push('\n');
    out.push_str(&format_kpis(&r.kpis, &dash.comparison, ppi_warning_pct));

    if r.kpis.transaction_count == 0 {
        out.push_str(&format!("\n\n{}", NO_DATA.yellow()));
        return out;
    }

    let sections = [
        format_categories(&r.spend_by_category),
        format_monthly(&r.spend_by_month),
        format_vendors(&r.spend_by_vendor_top_n),
        format_concentration(&r.vendor_concentration),
        format_facilities(&r.spend_by_facility),
        format_contracts(&r.spend_by_contract_type),
        format_opportunities(&r.spend_by_contract_type),
    ];
    for s in sections {
        out.push_str("\n\n");
        out.push_str(&s);
    }
    out
}

pub(crate) fn format_kpis(kpis: &Kpis, cmp: &KpiComparison, ppi_warning_pct: f64) -> String {
    let mut table = Table::new();
    table.set_header(vec!["KPI", "Value", "vs. Prior Period"]);
    table.add_row(vec![
        Cell::new("Total Spend"),
        right(money_compact(kpis.total_spend)),
        right(delta(&cmp.total_spend)),
    ]);
    table.add_row(vec![
        Cell::new("Transactions"),
        right(thousands(kpis.transaction_count)),
        right(delta(&cmp.transaction_count)),
    ]);
    table.add_row(vec![
        Cell::new("Unique Vendors"),
        right(kpis.vendor_count),
        right(delta(&cmp.vendor_count)),
    ]);
    let ppi = pct(kpis.ppi_spend_pct);
    let ppi_cell = if kpis.ppi_spend_pct > ppi_warning_pct {
        Cell::new(ppi.red().bold()).set_alignment(CellAlignment::Right)
    } else {
        right(ppi)
    };
    table.add_row(vec![Cell::new("PPI Spend %"), ppi_cell, right(delta(&cmp.ppi_spend_pct))]);
    table.add_row(vec![
        Cell::new("Avg Transaction"),
        right(money(kpis.avg_transaction_value)),
        right(delta(&cmp.avg_transaction_value)),
    ]);
    format!("Key Metrics\n{table}")
}

pub(crate) fn format_categories(rows: &[CategorySpend]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Spend", "%", "Count"]);
    for c in rows {
        table.add_row(vec![
            Cell::new(c.category),
            right(money(c.spend)),
            right(pct(c.share_pct)),
            right(c.count),
        ]);
    }
    format!("Spend by Category\n{table}")
}

pub(crate) fn format_monthly(rows: &[MonthSpend]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Month", "Spend"]);
    for m in rows {
        table.add_row(vec![Cell::new(m.month), right(money(m.spend))]);
    }
    format!("Monthly Spend Trend\n{table}")
}

pub(crate) fn format_vendors(rows: &[VendorSpend]) -> String {
    let mut table = Table::new();
    let mut header = vec!["#".to_string(), "Vendor".to_string(), "Spend".to_string()];
    header.extend(ContractType::ALL.iter().map(|ct| ct.label().to_string()));
    table.set_header(header);
    for (i, v) in rows.iter().enumerate() {
        let mut row = vec![right(i + 1), Cell::new(&v.vendor), right(money(v.spend))];
        row.extend(ContractType::ALL.iter().map(|ct| right(money(v.by_contract.get(*ct)))));
        table.add_row(row);
    }
    format!("Top {} Vendors by Spend\n{table}", rows.len())
}

pub(crate) fn format_concentration(rows: &[VendorShare]) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Vendor", "Spend", "Share"]);
    for v in rows {
        table.add_row(vec![Cell::new(&v.vendor), right(money(v.spend)), right(pct(v.share_pct))]);
    }
    format!("Vendor Concentration\n{table}")
}

pub(crate) fn format_facilities(data: &FacilitySpend) -> String {
    let mut by_cat = Table::new();
    by_cat.set_header(vec!["Facility", "Category", "Spend"]);
    let mut last_facility: Option<&str> = None;
    for f in &data.by_category {
        let name = if last_facility == Some(f.facility_id.as_str()) {
            ""
        } else {
            f.facility_name.as_str()
        };
        last_facility = Some(f.facility_id.as_str());
        by_cat.add_row(vec![Cell::new(name), Cell::new(f.category), right(money(f.spend))]);
    }

    let mut mix = Table::new();
    mix.set_header(vec!["Facility", "PPI", "Non-PPI", "PPI %"]);
    for m in &data.ppi_mix {
        mix.add_row(vec![
            Cell::new(&m.facility_name),
            right(money(m.ppi_spend)),
            right(money(m.non_ppi_spend)),
            right(pct(m.ppi_pct)),
        ]);
    }
    format!("Spend by Facility\n{by_cat}\n\nFacility PPI Mix\n{mix}")
}

pub(crate) fn format_contracts(data: &ContractBreakdown) -> String {
    let mut table = Table::new();
    let mut header = vec!["Category".to_string()];
    header.extend(ContractType::ALL.iter().map(|ct| ct.label().to_string()));
    header.extend(["Total".to_string(), "Off-Contract %".to_string()]);
    table.set_header(header);
    for c in &data.by_category {
        let mut row = vec![Cell::new(c.category)];
        row.extend(ContractType::ALL.iter().map(|ct| right(money(c.by_contract.get(*ct)))));
        row.push(right(money(c.total)));
        row.push(right(pct(c.off_contract_pct)));
        table.add_row(row);
    }
    format!("Contract Type by Category\n{table}")
}

pub(crate) fn format_opportunities(data: &ContractBreakdown) -> String {
    let title = "Off-Contract Spend Opportunities";
    if data.opportunities.is_empty() {
        return format!(
            "{title}\nNo categories exceed the {:.0}% off-contract threshold in the current filter selection.",
            data.threshold_pct
        );
    }
    let mut table = Table::new();
    table.set_header(vec!["Spend Category", "Total Category Spend", "Off-Contract Spend", "Off-Contract %"]);
    for c in &data.opportunities {
        table.add_row(vec![
            Cell::new(c.category),
            right(money(c.total)),
            right(money(c.by_contract.off_contract)),
            Cell::new(pct(c.off_contract_pct).red()).set_alignment(CellAlignment::Right),
        ]);
    }
    format!(
        "{title}\nCategories with >{:.0}% off-contract spend represent potential savings from contract renegotiation.\n{table}",
        data.threshold_pct
    )
}
