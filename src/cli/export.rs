use std::path::Path;

use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{FilterArgs, Session};
use crate::error::Result;
use crate::filter::apply_filters;
use crate::fmt::money;
use crate::loader::{export_transactions, write_transactions};
use crate::models::Transaction;

pub fn run(data: Option<&str>, filters: &FilterArgs, output: Option<&str>) -> Result<()> {
    let session = Session::open(data)?;
    let criteria = session.criteria(filters)?;
    let filtered = apply_filters(&session.table, &criteria);

    match output {
        Some(path) => {
            let path = Path::new(path);
            export_transactions(&filtered, path)?;
            eprintln!("Wrote {} transactions to {}", filtered.len(), path.display());
        }
        None => write_transactions(&filtered, std::io::stdout().lock())?,
    }
    Ok(())
}

pub fn detail(data: Option<&str>, filters: &FilterArgs, limit: usize) -> Result<()> {
    let session = Session::open(data)?;
    let criteria = session.criteria(filters)?;
    let filtered = apply_filters(&session.table, &criteria);

    let mut rows: Vec<&Transaction> = filtered.iter().collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    println!("{}", format_detail(&rows, limit));
    if rows.len() > limit {
        println!("Showing {limit} of {} transactions.", rows.len());
    }
    Ok(())
}

fn format_detail(rows: &[&Transaction], limit: usize) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "Date", "ID", "Facility", "Category", "Vendor", "Product", "Amount", "Contract", "PPI",
    ]);
    for t in rows.iter().take(limit) {
        table.add_row(vec![
            Cell::new(t.date),
            Cell::new(&t.transaction_id),
            Cell::new(&t.facility_name),
            Cell::new(t.category),
            Cell::new(&t.vendor),
            Cell::new(&t.product_description),
            Cell::new(money(t.amount)).set_alignment(CellAlignment::Right),
            Cell::new(t.contract_type),
            Cell::new(if t.is_ppi { "yes" } else { "" }),
        ]);
    }
    format!("Transaction Detail\n{table}")
}
