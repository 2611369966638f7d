use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{DataError, Result};
use crate::models::{slugify, Category, ContractType, Table, Transaction};

/// Columns that must be present in every input file.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "transaction_date",
    "facility_name",
    "spend_category",
    "vendor_name",
    "product_description",
    "total_amount",
    "contract_type",
    "ppi_flag",
];

/// Column order used when writing a table back out.
pub const EXPORT_COLUMNS: &[&str] = &[
    "transaction_id",
    "transaction_date",
    "facility_id",
    "facility_name",
    "department",
    "spend_category",
    "vendor_name",
    "product_description",
    "unit_price",
    "quantity",
    "total_amount",
    "contract_type",
    "ppi_flag",
];

type LoadResult<T> = std::result::Result<T, DataError>;

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = match raw.get(..10) {
        Some(head) if raw.len() == 10 => head,
        Some(head) if raw[10..].starts_with([' ', 'T']) => head,
        _ => return None,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// load_transactions
// ---------------------------------------------------------------------------

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> LoadResult<Self> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !index.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DataError::MissingColumns(missing));
        }
        Ok(Self { index })
    }

    /// Trimmed field value; empty string for optional columns that are absent.
    fn get<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

/// Read and validate a transaction CSV.
///
/// Unknown category labels are coerced into `Other/Miscellaneous` (logged
/// once per label). Unknown contract types, bad dates, bad or negative
/// amounts and bad PPI flags reject the whole file.
pub fn load_transactions(path: &Path) -> LoadResult<Table> {
    if !path.exists() {
        return Err(DataError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut rows = Vec::new();
    let mut coerced: BTreeSet<String> = BTreeSet::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        rows.push(parse_row(&columns, &record, row, &mut coerced)?);
    }

    if rows.is_empty() {
        return Err(DataError::Empty(path.to_path_buf()));
    }

    for label in &coerced {
        log::warn!("Unrecognized category '{label}' mapped to {}", Category::OtherMiscellaneous);
    }
    log::info!("Loaded {} transactions from {}", rows.len(), path.display());
    Ok(Table::new(rows))
}

fn parse_row(
    columns: &Columns,
    record: &csv::StringRecord,
    row: usize,
    coerced: &mut BTreeSet<String>,
) -> LoadResult<Transaction> {
    let raw_date = columns.get(record, "transaction_date");
    let date = parse_date(raw_date).ok_or_else(|| DataError::InvalidDate {
        row,
        value: raw_date.to_string(),
    })?;

    let raw_amount = columns.get(record, "total_amount");
    let amount = parse_amount(raw_amount).ok_or_else(|| DataError::InvalidAmount {
        row,
        column: "total_amount",
        value: raw_amount.to_string(),
    })?;
    if amount < 0.0 {
        return Err(DataError::NegativeAmount { row, value: amount });
    }

    let unit_price = match columns.get(record, "unit_price") {
        "" => amount,
        raw => parse_amount(raw).ok_or_else(|| DataError::InvalidAmount {
            row,
            column: "unit_price",
            value: raw.to_string(),
        })?,
    };

    let quantity = match columns.get(record, "quantity") {
        "" => 1,
        raw => raw.parse::<u32>().map_err(|_| DataError::InvalidAmount {
            row,
            column: "quantity",
            value: raw.to_string(),
        })?,
    };

    let raw_category = columns.get(record, "spend_category");
    let category = Category::parse(raw_category).unwrap_or_else(|| {
        coerced.insert(raw_category.to_string());
        Category::OtherMiscellaneous
    });

    let raw_contract = columns.get(record, "contract_type");
    let contract_type =
        ContractType::parse(raw_contract).ok_or_else(|| DataError::UnknownContractType {
            row,
            value: raw_contract.to_string(),
        })?;

    let raw_flag = columns.get(record, "ppi_flag");
    let is_ppi = parse_flag(raw_flag).ok_or_else(|| DataError::InvalidFlag {
        row,
        value: raw_flag.to_string(),
    })?;

    let facility_name = columns.get(record, "facility_name").to_string();
    let facility_id = match columns.get(record, "facility_id") {
        "" => slugify(&facility_name),
        id => id.to_string(),
    };
    let transaction_id = match columns.get(record, "transaction_id") {
        "" => format!("ROW-{row}"),
        id => id.to_string(),
    };
    let department = match columns.get(record, "department") {
        "" => category.label().to_string(),
        d => d.to_string(),
    };

    Ok(Transaction {
        transaction_id,
        date,
        facility_id,
        facility_name,
        department,
        category,
        vendor: columns.get(record, "vendor_name").to_string(),
        product_description: columns.get(record, "product_description").to_string(),
        unit_price,
        quantity,
        amount,
        contract_type,
        is_ppi,
    })
}

// ---------------------------------------------------------------------------
// TableCache
// ---------------------------------------------------------------------------

/// Load-once cache keyed by file path. A request for a different path drops
/// the cached table and reads the new file; the same path never re-reads.
#[derive(Debug, Default)]
pub struct TableCache {
    entry: Option<(PathBuf, Arc<Table>)>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<Table>> {
        if let Some((cached, table)) = &self.entry {
            if cached == path {
                log::debug!("Table cache hit for {}", path.display());
                return Ok(Arc::clone(table));
            }
            log::info!("Data path changed, reloading from {}", path.display());
        }
        let table = Arc::new(load_transactions(path)?);
        self.entry = Some((path.to_path_buf(), Arc::clone(&table)));
        Ok(table)
    }

    pub fn cached_path(&self) -> Option<&Path> {
        self.entry.as_ref().map(|(p, _)| p.as_path())
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Write `table` as CSV with the full input column set.
pub fn write_transactions<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(EXPORT_COLUMNS)?;
    for t in table {
        wtr.write_record([
            t.transaction_id.clone(),
            t.date.format("%Y-%m-%d").to_string(),
            t.facility_id.clone(),
            t.facility_name.clone(),
            t.department.clone(),
            t.category.label().to_string(),
            t.vendor.clone(),
            t.product_description.clone(),
            t.unit_price.to_string(),
            t.quantity.to_string(),
            t.amount.to_string(),
            t.contract_type.label().to_string(),
            if t.is_ppi { "True" } else { "False" }.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_transactions(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    write_transactions(table, file)?;
    log::info!("Exported {} transactions to {}", table.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpendError;

    const HEADER: &str = "transaction_id,transaction_date,facility_name,department,spend_category,vendor_name,product_description,unit_price,quantity,total_amount,contract_type,ppi_flag";

    fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut content = format!("{HEADER}\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("$500"), Some(500.0));
        assert_eq!(parse_amount("\"42.10\""), Some(42.1));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-01-15").unwrap().to_string(), "2024-01-15");
        assert_eq!(parse_date("2024-01-15 00:00:00").unwrap().to_string(), "2024-01-15");
        assert_eq!(parse_date("2024-01-15T08:30:00").unwrap().to_string(), "2024-01-15");
        assert!(parse_date("01/15/2024").is_none());
        assert!(parse_date("2024-02-30").is_none());
        assert!(parse_date("2024-01-150").is_none());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_load_parses_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "spend.csv", &[
            "TXN-1,2024-01-15,Memorial Regional Medical Center,Orthopedics,Orthopedics,Stryker,Primary Total Hip System,5000.00,2,10000.00,GPO,True",
            "TXN-2,2024-02-03,Northside Community Hospital,Radiology,Radiology,Philips,Contrast Media,250.50,2,501.00,Off-Contract,False",
        ]);
        let table = load_transactions(&path).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.rows()[0];
        assert_eq!(first.transaction_id, "TXN-1");
        assert_eq!(first.facility_id, "memorial-regional-medical-center");
        assert_eq!(first.category, Category::Orthopedics);
        assert_eq!(first.quantity, 2);
        assert_eq!(first.amount, 10000.0);
        assert!(first.is_ppi);
        assert_eq!(table.rows()[1].contract_type, ContractType::OffContract);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_transactions(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
        assert!(err.to_string().contains("Data file not found"));
    }

    #[test]
    fn test_load_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "transaction_date,vendor_name\n2024-01-01,Stryker\n").unwrap();
        match load_transactions(&path).unwrap_err() {
            DataError::MissingColumns(cols) => {
                assert!(cols.contains(&"total_amount".to_string()));
                assert!(cols.contains(&"ppi_flag".to_string()));
                assert!(!cols.contains(&"vendor_name".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_header_only_is_empty_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "empty.csv", &[]);
        assert!(matches!(load_transactions(&path).unwrap_err(), DataError::Empty(_)));
    }

    #[test]
    fn test_load_rejects_bad_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "spend.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,10,GPO,False",
            "TXN-2,15/01/2024,A,Radiology,Radiology,Philips,Item,10,1,10,GPO,False",
        ]);
        match load_transactions(&path).unwrap_err() {
            DataError::InvalidDate { row, value } => {
                assert_eq!(row, 2);
                assert_eq!(value, "15/01/2024");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_rejects_negative_and_unparseable_amounts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "neg.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,-10,GPO,False",
        ]);
        assert!(matches!(load_transactions(&path).unwrap_err(), DataError::NegativeAmount { row: 1, .. }));

        let path = write_csv(dir.path(), "nan.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,ten,GPO,False",
        ]);
        assert!(matches!(
            load_transactions(&path).unwrap_err(),
            DataError::InvalidAmount { column: "total_amount", .. }
        ));
    }

    #[test]
    fn test_load_rejects_unknown_contract_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "spend.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,10,Spot Buy,False",
        ]);
        assert!(matches!(
            load_transactions(&path).unwrap_err(),
            DataError::UnknownContractType { row: 1, .. }
        ));
    }

    #[test]
    fn test_load_coerces_unknown_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "spend.csv", &[
            "TXN-1,2024-01-15,A,Cardiology,Cardiology,Abbott,Stent,10,1,10,Local,True",
        ]);
        let table = load_transactions(&path).unwrap();
        assert_eq!(table.rows()[0].category, Category::OtherMiscellaneous);
        assert_eq!(table.rows()[0].department, "Cardiology");
    }

    #[test]
    fn test_load_optional_columns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minimal.csv");
        std::fs::write(
            &path,
            "transaction_date,facility_name,spend_category,vendor_name,product_description,total_amount,contract_type,ppi_flag\n\
             2024-05-01,Riverside General Hospital,Vascular,Abbott,Stent,\"1,200.00\",GPO,yes\n",
        )
        .unwrap();
        let table = load_transactions(&path).unwrap();
        let t = &table.rows()[0];
        assert_eq!(t.transaction_id, "ROW-1");
        assert_eq!(t.department, "Vascular");
        assert_eq!(t.quantity, 1);
        assert_eq!(t.unit_price, 1200.0);
        assert_eq!(t.facility_id, "riverside-general-hospital");
    }

    #[test]
    fn test_cache_does_not_reread_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "spend.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,10,GPO,False",
        ]);
        let mut cache = TableCache::new();
        let first = cache.get(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = cache.get(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.cached_path(), Some(path.as_path()));
    }

    #[test]
    fn test_cache_reloads_when_path_changes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_csv(dir.path(), "a.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,10,GPO,False",
        ]);
        let b = write_csv(dir.path(), "b.csv", &[
            "TXN-1,2024-01-15,A,Radiology,Radiology,Philips,Item,10,1,10,GPO,False",
            "TXN-2,2024-01-16,A,Radiology,Radiology,Philips,Item,10,1,10,GPO,False",
        ]);
        let mut cache = TableCache::new();
        assert_eq!(cache.get(&a).unwrap().len(), 1);
        assert_eq!(cache.get(&b).unwrap().len(), 2);
        assert_eq!(cache.cached_path(), Some(b.as_path()));

        cache.invalidate();
        assert!(cache.cached_path().is_none());
        let missing = dir.path().join("gone.csv");
        assert!(matches!(cache.get(&missing), Err(SpendError::Data(DataError::NotFound(_)))));
    }

    #[test]
    fn test_export_reloads_to_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "spend.csv", &[
            "TXN-1,2024-01-15,Memorial Regional Medical Center,Orthopedics,Orthopedics,Stryker,\"Hip, Primary\",5000.00,2,10000.00,GPO,True",
            "TXN-2,2024-02-03,Northside Community Hospital,Radiology,Radiology,Philips,Contrast,250.50,2,501.00,Local,False",
            "TXN-3,2024-02-04,Northside Community Hospital,Vascular,Vascular,Abbott,Guidewire,3.335,3,10.005,GPO,False",
        ]);
        let table = load_transactions(&path).unwrap();
        assert_eq!(table.rows()[2].amount, 10.005);
        let out = dir.path().join("exports").join("filtered.csv");
        export_transactions(&table, &out).unwrap();
        let reloaded = load_transactions(&out).unwrap();
        assert_eq!(reloaded, table);

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with(&EXPORT_COLUMNS.join(",")));
        assert!(text.contains(",3.335,3,10.005,"));
    }
}
