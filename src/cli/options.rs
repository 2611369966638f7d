use crate::cli::Session;
use crate::error::Result;
use crate::fmt::{money, thousands};
use crate::models::Table;

pub fn run(data: Option<&str>) -> Result<()> {
    let session = Session::open(data)?;
    println!("Data file:     {}", session.path.display());
    println!("{}", format_options(&session.table));
    Ok(())
}

fn format_options(table: &Table) -> String {
    let mut out = String::new();
    out.push_str(&format!("Transactions:  {}\n", thousands(table.len())));
    if let Some((min, max)) = table.date_bounds() {
        out.push_str(&format!("Date range:    {min} to {max}\n"));
    }

    out.push_str("\nFacilities (--facility):\n");
    for (id, name) in table.facilities() {
        out.push_str(&format!("  {name}  [{id}]\n"));
    }

    out.push_str("\nCategories (--category):\n");
    for c in table.categories() {
        out.push_str(&format!("  {c}\n"));
    }

    out.push_str("\nVendors by spend (--vendor):\n");
    for (vendor, spend) in table.vendors_by_spend() {
        out.push_str(&format!("  {vendor:<28} {}\n", money(spend)));
    }

    out.push_str("\nContract types (--contract-type):\n");
    for ct in table.contract_types() {
        out.push_str(&format!("  {ct}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::txn;
    use crate::models::{Category, ContractType};

    #[test]
    fn test_format_options_lists_filter_values() {
        let table = Table::new(vec![
            txn("2024-01-15", Category::Orthopedics, "Stryker", ContractType::Gpo, 100.0, true),
            txn("2024-06-15", Category::Radiology, "Philips", ContractType::OffContract, 250.0, false),
        ]);
        let out = format_options(&table);
        assert!(out.contains("Date range:    2024-01-15 to 2024-06-15"));
        assert!(out.contains("[memorial-regional]"));
        assert!(out.contains("Orthopedics"));
        assert!(out.contains("Off-Contract"));
        assert!(out.find("Philips").unwrap() < out.find("Stryker").unwrap());
    }
}
