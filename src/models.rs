use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    #[serde(rename = "Orthopedics")]
    Orthopedics,
    #[serde(rename = "Biomedical Equipment")]
    BiomedicalEquipment,
    #[serde(rename = "Surgical Supplies")]
    SurgicalSupplies,
    #[serde(rename = "Biologics & Wound Care")]
    BiologicsWoundCare,
    #[serde(rename = "Radiology")]
    Radiology,
    #[serde(rename = "Clinical Engineering Services")]
    ClinicalEngineeringServices,
    #[serde(rename = "Vascular")]
    Vascular,
    #[serde(rename = "Other/Miscellaneous")]
    OtherMiscellaneous,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Orthopedics,
        Category::BiomedicalEquipment,
        Category::SurgicalSupplies,
        Category::BiologicsWoundCare,
        Category::Radiology,
        Category::ClinicalEngineeringServices,
        Category::Vascular,
        Category::OtherMiscellaneous,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Orthopedics => "Orthopedics",
            Self::BiomedicalEquipment => "Biomedical Equipment",
            Self::SurgicalSupplies => "Surgical Supplies",
            Self::BiologicsWoundCare => "Biologics & Wound Care",
            Self::Radiology => "Radiology",
            Self::ClinicalEngineeringServices => "Clinical Engineering Services",
            Self::Vascular => "Vascular",
            Self::OtherMiscellaneous => "Other/Miscellaneous",
        }
    }

    /// Case- and punctuation-insensitive match against the known labels.
    /// "other" and "misc" are accepted for the catch-all bucket.
    pub fn parse(raw: &str) -> Option<Category> {
        let key = normalize(raw);
        if key.is_empty() {
            return None;
        }
        if key == "other" || key == "misc" || key == "miscellaneous" {
            return Some(Self::OtherMiscellaneous);
        }
        Self::ALL.iter().copied().find(|c| normalize(c.label()) == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ContractType {
    #[serde(rename = "GPO")]
    Gpo,
    #[serde(rename = "Local")]
    Local,
    #[serde(rename = "Off-Contract")]
    OffContract,
}

impl ContractType {
    pub const ALL: [ContractType; 3] = [ContractType::Gpo, ContractType::Local, ContractType::OffContract];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Gpo => "GPO",
            Self::Local => "Local",
            Self::OffContract => "Off-Contract",
        }
    }

    pub fn parse(raw: &str) -> Option<ContractType> {
        match normalize(raw).as_str() {
            "gpo" => Some(Self::Gpo),
            "local" => Some(Self::Local),
            "offcontract" => Some(Self::OffContract),
            _ => None,
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Lowercase, hyphen-separated identifier derived from a display name:
/// "St. Joseph's University Hospital" → "st-joseph-s-university-hospital".
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Calendar month key. Field order makes the derived `Ord` chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub date: NaiveDate,
    pub facility_id: String,
    pub facility_name: String,
    pub department: String,
    pub category: Category,
    pub vendor: String,
    pub product_description: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub amount: f64,
    pub contract_type: ContractType,
    pub is_ppi: bool,
}

/// In-memory transaction table. Immutable once loaded; filtering produces a
/// new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Transaction>,
}

impl Table {
    pub fn new(rows: Vec<Transaction>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Earliest and latest transaction dates.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.rows.iter().map(|t| t.date).min()?;
        let max = self.rows.iter().map(|t| t.date).max()?;
        Some((min, max))
    }

    /// Distinct (facility_id, facility_name) pairs sorted by name.
    pub fn facilities(&self) -> Vec<(String, String)> {
        let mut by_id: BTreeMap<&str, &str> = BTreeMap::new();
        for t in &self.rows {
            by_id.entry(&t.facility_id).or_insert(&t.facility_name);
        }
        let mut out: Vec<(String, String)> = by_id
            .into_iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    /// Distinct categories present, sorted by label.
    pub fn categories(&self) -> Vec<Category> {
        let set: BTreeSet<Category> = self.rows.iter().map(|t| t.category).collect();
        let mut out: Vec<Category> = set.into_iter().collect();
        out.sort_by_key(|c| c.label());
        out
    }

    /// Distinct vendors ordered by total spend, largest first.
    pub fn vendors_by_spend(&self) -> Vec<(String, f64)> {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for t in &self.rows {
            *totals.entry(&t.vendor).or_insert(0.0) += t.amount;
        }
        let mut out: Vec<(String, f64)> = totals
            .into_iter()
            .map(|(v, total)| (v.to_string(), total))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn contract_types(&self) -> Vec<ContractType> {
        let set: BTreeSet<ContractType> = self.rows.iter().map(|t| t.contract_type).collect();
        set.into_iter().collect()
    }
}

impl FromIterator<Transaction> for Table {
    fn from_iter<I: IntoIterator<Item = Transaction>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a transaction with sensible defaults for the fields a test does
    /// not care about.
    pub fn txn(
        date: &str,
        category: Category,
        vendor: &str,
        contract_type: ContractType,
        amount: f64,
        is_ppi: bool,
    ) -> Transaction {
        Transaction {
            transaction_id: format!("TXN-{date}-{vendor}"),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            facility_id: "memorial-regional".to_string(),
            facility_name: "Memorial Regional".to_string(),
            department: category.label().to_string(),
            category,
            vendor: vendor.to_string(),
            product_description: "Test item".to_string(),
            unit_price: amount,
            quantity: 1,
            amount,
            contract_type,
            is_ppi,
        }
    }

    pub fn at_facility(mut t: Transaction, name: &str) -> Transaction {
        t.facility_id = slugify(name);
        t.facility_name = name.to_string();
        t
    }
}
