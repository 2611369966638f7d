use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::filter::{apply_filters, FilterCriteria};
use crate::models::{Category, ContractType, Table, YearMonth};

pub const DEFAULT_TOP_N: usize = 15;
pub const DEFAULT_OFF_CONTRACT_THRESHOLD_PCT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateOptions {
    /// Vendors kept in `spend_by_vendor_top_n`. The rest are dropped, not
    /// folded into an "other" row.
    pub top_n: usize,
    /// Off-contract share (percent) above which a category is flagged.
    pub off_contract_threshold_pct: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            off_contract_threshold_pct: DEFAULT_OFF_CONTRACT_THRESHOLD_PCT,
        }
    }
}

// ---------------------------------------------------------------------------
// KPIs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Kpis {
    pub total_spend: f64,
    pub transaction_count: usize,
    pub vendor_count: usize,
    pub ppi_spend_pct: f64,
    pub avg_transaction_value: f64,
}

/// Headline scalars. Every ratio is 0 when its denominator is 0.
pub fn calculate_kpis(table: &Table) -> Kpis {
    let total_spend: f64 = table.iter().map(|t| t.amount).sum();
    let transaction_count = table.len();
    let vendor_count = table.iter().map(|t| t.vendor.as_str()).collect::<BTreeSet<_>>().len();
    let ppi_spend: f64 = table.iter().filter(|t| t.is_ppi).map(|t| t.amount).sum();

    Kpis {
        total_spend,
        transaction_count,
        vendor_count,
        ppi_spend_pct: pct_of(ppi_spend, total_spend),
        avg_transaction_value: if transaction_count > 0 {
            total_spend / transaction_count as f64
        } else {
            0.0
        },
    }
}

fn pct_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part * 100.0 / whole
    } else {
        0.0
    }
}

/// Largest spend first; equal spend falls back to `tie`.
fn by_spend_desc(a: f64, b: f64, tie: Ordering) -> Ordering {
    b.total_cmp(&a).then(tie)
}

// ---------------------------------------------------------------------------
// Grouped tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySpend {
    pub category: Category,
    pub spend: f64,
    pub count: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSpend {
    pub month: YearMonth,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCategorySpend {
    pub month: YearMonth,
    pub category: Category,
    pub spend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ContractSplit {
    pub gpo: f64,
    pub local: f64,
    pub off_contract: f64,
}

impl ContractSplit {
    fn add(&mut self, contract_type: ContractType, amount: f64) {
        match contract_type {
            ContractType::Gpo => self.gpo += amount,
            ContractType::Local => self.local += amount,
            ContractType::OffContract => self.off_contract += amount,
        }
    }

    pub fn get(&self, contract_type: ContractType) -> f64 {
        match contract_type {
            ContractType::Gpo => self.gpo,
            ContractType::Local => self.local,
            ContractType::OffContract => self.off_contract,
        }
    }

    pub fn total(&self) -> f64 {
        self.gpo + self.local + self.off_contract
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorSpend {
    pub vendor: String,
    pub spend: f64,
    pub by_contract: ContractSplit,
}

/// One vendor's share of total spend. Unlike the top-N table this covers
/// every vendor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorShare {
    pub vendor: String,
    pub spend: f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityCategorySpend {
    pub facility_id: String,
    pub facility_name: String,
    pub category: Category,
    pub spend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityPpiMix {
    pub facility_id: String,
    pub facility_name: String,
    pub ppi_spend: f64,
    pub non_ppi_spend: f64,
    pub ppi_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FacilitySpend {
    pub by_category: Vec<FacilityCategorySpend>,
    pub ppi_mix: Vec<FacilityPpiMix>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryContractSpend {
    pub category: Category,
    pub by_contract: ContractSplit,
    pub total: f64,
    pub off_contract_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContractBreakdown {
    pub by_category: Vec<CategoryContractSpend>,
    pub threshold_pct: f64,
    /// Categories whose off-contract share exceeds `threshold_pct`, highest
    /// share first.
    pub opportunities: Vec<CategoryContractSpend>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateResult {
    pub kpis: Kpis,
    pub spend_by_category: Vec<CategorySpend>,
    pub spend_by_month: Vec<MonthSpend>,
    pub spend_by_month_category: Vec<MonthCategorySpend>,
    pub spend_by_vendor_top_n: Vec<VendorSpend>,
    pub vendor_concentration: Vec<VendorShare>,
    pub spend_by_facility: FacilitySpend,
    pub spend_by_contract_type: ContractBreakdown,
}

pub fn aggregate(table: &Table) -> AggregateResult {
    aggregate_with(table, &AggregateOptions::default())
}

pub fn aggregate_with(table: &Table, options: &AggregateOptions) -> AggregateResult {
    let kpis = calculate_kpis(table);
    let spend_by_category = spend_by_category(table, kpis.total_spend);
    let rank = category_rank(&spend_by_category);

    log::debug!("Aggregating {} rows", table.len());
    AggregateResult {
        kpis,
        spend_by_month: spend_by_month(table),
        spend_by_month_category: spend_by_month_category(table, &rank),
        spend_by_vendor_top_n: spend_by_vendor_top_n(table, options.top_n),
        vendor_concentration: vendor_concentration(table, kpis.total_spend),
        spend_by_facility: spend_by_facility(table, &rank),
        spend_by_contract_type: spend_by_contract_type(table, options.off_contract_threshold_pct),
        spend_by_category,
    }
}

fn spend_by_category(table: &Table, total_spend: f64) -> Vec<CategorySpend> {
    let mut groups: HashMap<Category, (f64, usize)> = HashMap::new();
    for t in table {
        let entry = groups.entry(t.category).or_insert((0.0, 0));
        entry.0 += t.amount;
        entry.1 += 1;
    }
    let mut out: Vec<CategorySpend> = groups
        .into_iter()
        .map(|(category, (spend, count))| CategorySpend {
            category,
            spend,
            count,
            share_pct: pct_of(spend, total_spend),
        })
        .collect();
    out.sort_by(|a, b| by_spend_desc(a.spend, b.spend, a.category.label().cmp(b.category.label())));
    out
}

/// Position of each category in the descending-spend ordering, used to
/// order categories inside stacked series.
fn category_rank(categories: &[CategorySpend]) -> HashMap<Category, usize> {
    categories
        .iter()
        .enumerate()
        .map(|(i, c)| (c.category, i))
        .collect()
}

fn spend_by_month(table: &Table) -> Vec<MonthSpend> {
    let mut months: BTreeMap<YearMonth, f64> = BTreeMap::new();
    for t in table {
        *months.entry(YearMonth::of(t.date)).or_insert(0.0) += t.amount;
    }
    months
        .into_iter()
        .map(|(month, spend)| MonthSpend { month, spend })
        .collect()
}

fn spend_by_month_category(table: &Table, rank: &HashMap<Category, usize>) -> Vec<MonthCategorySpend> {
    let mut groups: BTreeMap<(YearMonth, usize), (Category, f64)> = BTreeMap::new();
    for t in table {
        let key = (YearMonth::of(t.date), rank.get(&t.category).copied().unwrap_or(usize::MAX));
        groups.entry(key).or_insert((t.category, 0.0)).1 += t.amount;
    }
    groups
        .into_iter()
        .map(|((month, _), (category, spend))| MonthCategorySpend { month, category, spend })
        .collect()
}

fn spend_by_vendor_top_n(table: &Table, top_n: usize) -> Vec<VendorSpend> {
    let mut groups: HashMap<&str, ContractSplit> = HashMap::new();
    for t in table {
        groups.entry(&t.vendor).or_default().add(t.contract_type, t.amount);
    }
    let mut out: Vec<VendorSpend> = groups
        .into_iter()
        .map(|(vendor, by_contract)| VendorSpend {
            vendor: vendor.to_string(),
            spend: by_contract.total(),
            by_contract,
        })
        .collect();
    out.sort_by(|a, b| by_spend_desc(a.spend, b.spend, a.vendor.cmp(&b.vendor)));
    out.truncate(top_n);
    out
}

fn vendor_concentration(table: &Table, total_spend: f64) -> Vec<VendorShare> {
    let mut groups: HashMap<&str, f64> = HashMap::new();
    for t in table {
        *groups.entry(&t.vendor).or_insert(0.0) += t.amount;
    }
    let mut out: Vec<VendorShare> = groups
        .into_iter()
        .map(|(vendor, spend)| VendorShare {
            vendor: vendor.to_string(),
            spend,
            share_pct: pct_of(spend, total_spend),
        })
        .collect();
    out.sort_by(|a, b| by_spend_desc(a.spend, b.spend, a.vendor.cmp(&b.vendor)));
    out
}

fn spend_by_facility(table: &Table, rank: &HashMap<Category, usize>) -> FacilitySpend {
    struct Acc<'a> {
        name: &'a str,
        ppi: f64,
        non_ppi: f64,
        categories: HashMap<Category, f64>,
    }

    let mut groups: HashMap<&str, Acc> = HashMap::new();
    for t in table {
        let acc = groups.entry(&t.facility_id).or_insert_with(|| Acc {
            name: &t.facility_name,
            ppi: 0.0,
            non_ppi: 0.0,
            categories: HashMap::new(),
        });
        if t.is_ppi {
            acc.ppi += t.amount;
        } else {
            acc.non_ppi += t.amount;
        }
        *acc.categories.entry(t.category).or_insert(0.0) += t.amount;
    }

    let mut facilities: Vec<(&str, Acc)> = groups.into_iter().collect();
    facilities.sort_by(|a, b| {
        by_spend_desc(a.1.ppi + a.1.non_ppi, b.1.ppi + b.1.non_ppi, a.1.name.cmp(b.1.name))
    });

    let mut result = FacilitySpend::default();
    for (id, acc) in facilities {
        let mut cats: Vec<(Category, f64)> = acc.categories.into_iter().collect();
        cats.sort_by_key(|(c, _)| rank.get(c).copied().unwrap_or(usize::MAX));
        for (category, spend) in cats {
            result.by_category.push(FacilityCategorySpend {
                facility_id: id.to_string(),
                facility_name: acc.name.to_string(),
                category,
                spend,
            });
        }
        result.ppi_mix.push(FacilityPpiMix {
            facility_id: id.to_string(),
            facility_name: acc.name.to_string(),
            ppi_spend: acc.ppi,
            non_ppi_spend: acc.non_ppi,
            ppi_pct: pct_of(acc.ppi, acc.ppi + acc.non_ppi),
        });
    }
    result
}

fn spend_by_contract_type(table: &Table, threshold_pct: f64) -> ContractBreakdown {
    let mut groups: HashMap<Category, ContractSplit> = HashMap::new();
    for t in table {
        groups.entry(t.category).or_default().add(t.contract_type, t.amount);
    }
    let mut by_category: Vec<CategoryContractSpend> = groups
        .into_iter()
        .map(|(category, by_contract)| {
            let total = by_contract.total();
            CategoryContractSpend {
                category,
                by_contract,
                total,
                off_contract_pct: pct_of(by_contract.off_contract, total),
            }
        })
        .collect();
    by_category.sort_by(|a, b| by_spend_desc(a.total, b.total, a.category.label().cmp(b.category.label())));

    let mut opportunities: Vec<CategoryContractSpend> = by_category
        .iter()
        .filter(|c| c.off_contract_pct > threshold_pct)
        .cloned()
        .collect();
    opportunities.sort_by(|a, b| {
        by_spend_desc(a.off_contract_pct, b.off_contract_pct, a.category.label().cmp(b.category.label()))
    });

    ContractBreakdown {
        by_category,
        threshold_pct,
        opportunities,
    }
}

// ---------------------------------------------------------------------------
// Prior-period comparison
// ---------------------------------------------------------------------------

/// Percentage change against a prior value. `None` ("N/A") when the prior
/// baseline is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Delta(pub Option<f64>);

impl Delta {
    pub fn between(current: f64, prior: f64) -> Delta {
        if prior == 0.0 {
            Delta(None)
        } else {
            Delta(Some((current - prior) / prior * 100.0))
        }
    }

    pub fn pct(&self) -> Option<f64> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KpiComparison {
    pub prior: Option<Kpis>,
    pub total_spend: Delta,
    pub transaction_count: Delta,
    pub vendor_count: Delta,
    pub ppi_spend_pct: Delta,
    pub avg_transaction_value: Delta,
}

/// KPIs for the same selections over the equal-length period immediately
/// before the criteria's date range. `None` without a date range.
pub fn prior_period_kpis(full: &Table, criteria: &FilterCriteria) -> Option<Kpis> {
    let prior = criteria.date_range()?.prior_period()?;
    let table = apply_filters(full, &criteria.with_date_range(Some(prior)));
    Some(calculate_kpis(&table))
}

pub fn compare_kpis(current: &Kpis, prior: Option<&Kpis>) -> KpiComparison {
    let Some(p) = prior else {
        return KpiComparison {
            prior: None,
            total_spend: Delta(None),
            transaction_count: Delta(None),
            vendor_count: Delta(None),
            ppi_spend_pct: Delta(None),
            avg_transaction_value: Delta(None),
        };
    };
    KpiComparison {
        prior: Some(*p),
        total_spend: Delta::between(current.total_spend, p.total_spend),
        transaction_count: Delta::between(current.transaction_count as f64, p.transaction_count as f64),
        vendor_count: Delta::between(current.vendor_count as f64, p.vendor_count as f64),
        ppi_spend_pct: Delta::between(current.ppi_spend_pct, p.ppi_spend_pct),
        avg_transaction_value: Delta::between(current.avg_transaction_value, p.avg_transaction_value),
    }
}
