use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::FilterError;
use crate::loader::parse_date;
use crate::models::{slugify, Category, ContractType, Table, Transaction};

// ---------------------------------------------------------------------------
// DateRange
// ---------------------------------------------------------------------------

/// Inclusive date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FilterError> {
        if start > end {
            return Err(FilterError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Intersection with `bounds`, or `None` when they do not overlap.
    pub fn clamp_to(&self, bounds: (NaiveDate, NaiveDate)) -> Option<DateRange> {
        let start = self.start.max(bounds.0);
        let end = self.end.min(bounds.1);
        DateRange::new(start, end).ok()
    }

    /// The range of equal length ending the day before `start`.
    pub fn prior_period(&self) -> Option<DateRange> {
        let prior_end = self.start.pred_opt()?;
        let prior_start = prior_end.checked_sub_signed(self.end - self.start)?;
        Some(Self {
            start: prior_start,
            end: prior_end,
        })
    }
}

// ---------------------------------------------------------------------------
// FilterCriteria
// ---------------------------------------------------------------------------

/// Active filter selections. An empty set means "all values".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    date_range: Option<DateRange>,
    facilities: BTreeSet<String>,
    categories: BTreeSet<Category>,
    vendors: BTreeSet<String>,
    contract_types: BTreeSet<ContractType>,
    ppi_only: bool,
}

impl FilterCriteria {
    /// Criteria that pass every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn builder() -> FilterCriteriaBuilder {
        FilterCriteriaBuilder::default()
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    pub fn facilities(&self) -> &BTreeSet<String> {
        &self.facilities
    }

    pub fn categories(&self) -> &BTreeSet<Category> {
        &self.categories
    }

    pub fn vendors(&self) -> &BTreeSet<String> {
        &self.vendors
    }

    pub fn contract_types(&self) -> &BTreeSet<ContractType> {
        &self.contract_types
    }

    pub fn ppi_only(&self) -> bool {
        self.ppi_only
    }

    /// Same selections over a different date range.
    pub fn with_date_range(&self, range: Option<DateRange>) -> FilterCriteria {
        FilterCriteria {
            date_range: range,
            ..self.clone()
        }
    }

    pub fn matches(&self, t: &Transaction) -> bool {
        if let Some(range) = &self.date_range {
            if !range.contains(t.date) {
                return false;
            }
        }
        if !self.facilities.is_empty()
            && !self.facilities.contains(&slugify(&t.facility_id))
            && !self.facilities.contains(&slugify(&t.facility_name))
        {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&t.category) {
            return false;
        }
        if !self.vendors.is_empty() && !self.vendors.contains(&t.vendor.trim().to_lowercase()) {
            return false;
        }
        if !self.contract_types.is_empty() && !self.contract_types.contains(&t.contract_type) {
            return false;
        }
        !self.ppi_only || t.is_ppi
    }
}

/// Return the rows of `table` that satisfy every active predicate, in their
/// original order. An empty result is not an error.
pub fn apply_filters(table: &Table, criteria: &FilterCriteria) -> Table {
    let filtered: Table = table.iter().filter(|t| criteria.matches(t)).cloned().collect();
    log::debug!("Filter kept {} of {} rows", filtered.len(), table.len());
    filtered
}

/// Number of filter dimensions narrowing the table. A date range counts only
/// when it is narrower than the table's own date bounds.
pub fn active_filter_count(criteria: &FilterCriteria, table: &Table) -> usize {
    let date_active = match (criteria.date_range, table.date_bounds()) {
        (Some(range), Some(bounds)) => range.clamp_to(bounds) != DateRange::new(bounds.0, bounds.1).ok(),
        (Some(_), None) => true,
        (None, _) => false,
    };
    [
        date_active,
        !criteria.facilities.is_empty(),
        !criteria.categories.is_empty(),
        !criteria.vendors.is_empty(),
        !criteria.contract_types.is_empty(),
        criteria.ppi_only,
    ]
    .iter()
    .filter(|active| **active)
    .count()
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects raw filter input (CLI flags, UI selections) and validates it in
/// [`FilterCriteriaBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct FilterCriteriaBuilder {
    start: Option<Result<NaiveDate, String>>,
    end: Option<Result<NaiveDate, String>>,
    bounds: Option<(NaiveDate, NaiveDate)>,
    facilities: Vec<String>,
    categories: Vec<String>,
    vendors: Vec<String>,
    contract_types: Vec<String>,
    ppi_only: bool,
}

impl FilterCriteriaBuilder {
    pub fn date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(Ok(start));
        self.end = Some(Ok(end));
        self
    }

    pub fn from_date(mut self, raw: &str) -> Self {
        self.start = Some(parse_date(raw).ok_or_else(|| raw.to_string()));
        self
    }

    pub fn to_date(mut self, raw: &str) -> Self {
        self.end = Some(parse_date(raw).ok_or_else(|| raw.to_string()));
        self
    }

    /// Dataset bounds used to close a half-open range (`--from` without
    /// `--to` and vice versa).
    pub fn within(mut self, bounds: Option<(NaiveDate, NaiveDate)>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Facility id or display name.
    pub fn facility(mut self, facility: impl Into<String>) -> Self {
        self.facilities.push(facility.into());
        self
    }

    pub fn category(mut self, label: impl Into<String>) -> Self {
        self.categories.push(label.into());
        self
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendors.push(vendor.into());
        self
    }

    pub fn contract_type(mut self, label: impl Into<String>) -> Self {
        self.contract_types.push(label.into());
        self
    }

    pub fn ppi_only(mut self, ppi_only: bool) -> Self {
        self.ppi_only = ppi_only;
        self
    }

    pub fn build(self) -> Result<FilterCriteria, FilterError> {
        let start = self.start.transpose().map_err(FilterError::InvalidDate)?;
        let end = self.end.transpose().map_err(FilterError::InvalidDate)?;
        let date_range = match (start, end) {
            (None, None) => None,
            // A missing endpoint never inverts the range: an open `--from`
            // past the data yields an empty selection, not an error.
            (Some(start), None) => {
                let end = self.bounds.map_or(NaiveDate::MAX, |b| b.1.max(start));
                Some(DateRange::new(start, end)?)
            }
            (None, Some(end)) => {
                let start = self.bounds.map_or(NaiveDate::MIN, |b| b.0.min(end));
                Some(DateRange::new(start, end)?)
            }
            (Some(start), Some(end)) => Some(DateRange::new(start, end)?),
        };

        let categories = self
            .categories
            .iter()
            .map(|raw| Category::parse(raw).ok_or_else(|| FilterError::UnknownCategory(raw.clone())))
            .collect::<Result<BTreeSet<_>, _>>()?;

        let contract_types = self
            .contract_types
            .iter()
            .map(|raw| {
                ContractType::parse(raw).ok_or_else(|| FilterError::UnknownContractType(raw.clone()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(FilterCriteria {
            date_range,
            facilities: self.facilities.iter().map(|f| slugify(f)).collect(),
            categories,
            vendors: self.vendors.iter().map(|v| v.trim().to_lowercase()).collect(),
            contract_types,
            ppi_only: self.ppi_only,
        })
    }
}

// ---------------------------------------------------------------------------
// FilterState
// ---------------------------------------------------------------------------

/// Last valid filter selection. A rejected update leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    current: FilterCriteria,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.current
    }

    pub fn update(&mut self, builder: FilterCriteriaBuilder) -> Result<&FilterCriteria, FilterError> {
        match builder.build() {
            Ok(criteria) => {
                self.current = criteria;
                Ok(&self.current)
            }
            Err(e) => {
                log::warn!("Rejected filter input, keeping previous selection: {e}");
                Err(e)
            }
        }
    }

    pub fn reset(&mut self) {
        self.current = FilterCriteria::all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::{at_facility, txn};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> Table {
        Table::new(vec![
            at_facility(
                txn("2024-01-10", Category::Orthopedics, "VendorA", ContractType::Gpo, 1000.0, true),
                "Memorial Regional Medical Center",
            ),
            at_facility(
                txn("2024-02-20", Category::Radiology, "VendorB", ContractType::OffContract, 500.0, false),
                "Northside Community Hospital",
            ),
            at_facility(
                txn("2024-03-05", Category::Orthopedics, "VendorB", ContractType::Local, 250.0, true),
                "Northside Community Hospital",
            ),
            at_facility(
                txn("2024-03-31", Category::Vascular, "VendorC", ContractType::OffContract, 75.0, false),
                "St. Joseph's University Hospital",
            ),
        ])
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        let err = DateRange::new(d("2024-03-01"), d("2024-02-01")).unwrap_err();
        assert!(matches!(err, FilterError::InvertedRange { .. }));
        assert!(DateRange::new(d("2024-03-01"), d("2024-03-01")).is_ok());
    }

    #[test]
    fn test_prior_period_same_length_immediately_before() {
        let range = DateRange::new(d("2024-03-01"), d("2024-03-31")).unwrap();
        let prior = range.prior_period().unwrap();
        assert_eq!(prior.end(), d("2024-02-29"));
        assert_eq!(prior.start(), d("2024-01-30"));
        assert_eq!(prior.end() - prior.start(), range.end() - range.start());
    }

    #[test]
    fn test_clamp_to_bounds() {
        let range = DateRange::new(d("2023-06-01"), d("2024-02-01")).unwrap();
        let clamped = range.clamp_to((d("2024-01-01"), d("2024-12-31"))).unwrap();
        assert_eq!(clamped.start(), d("2024-01-01"));
        assert_eq!(clamped.end(), d("2024-02-01"));
        let outside = DateRange::new(d("2020-01-01"), d("2020-12-31")).unwrap();
        assert!(outside.clamp_to((d("2024-01-01"), d("2024-12-31"))).is_none());
    }

    #[test]
    fn test_no_criteria_keeps_everything_in_order() {
        let table = sample();
        let out = apply_filters(&table, &FilterCriteria::all());
        assert_eq!(out, table);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let table = sample();
        let criteria = FilterCriteria::builder()
            .from_date("2024-02-20")
            .to_date("2024-03-31")
            .build()
            .unwrap();
        let out = apply_filters(&table, &criteria);
        assert_eq!(out.len(), 3);
        assert_eq!(out.rows()[0].date, d("2024-02-20"));
        assert_eq!(out.rows()[2].date, d("2024-03-31"));
    }

    #[test]
    fn test_half_open_range_closes_on_bounds() {
        let table = sample();
        let criteria = FilterCriteria::builder()
            .from_date("2024-03-01")
            .within(table.date_bounds())
            .build()
            .unwrap();
        assert_eq!(criteria.date_range().unwrap().end(), d("2024-03-31"));
        assert_eq!(apply_filters(&table, &criteria).len(), 2);
    }

    #[test]
    fn test_half_open_range_beyond_data_is_empty_not_error() {
        let table = sample();
        let after = FilterCriteria::builder()
            .from_date("2025-06-01")
            .within(table.date_bounds())
            .build()
            .unwrap();
        assert_eq!(after.date_range().unwrap().end(), d("2025-06-01"));
        assert!(apply_filters(&table, &after).is_empty());

        let before = FilterCriteria::builder()
            .to_date("2023-06-01")
            .within(table.date_bounds())
            .build()
            .unwrap();
        assert_eq!(before.date_range().unwrap().start(), d("2023-06-01"));
        assert!(apply_filters(&table, &before).is_empty());

        let unbounded = FilterCriteria::builder().to_date("2024-02-20").build().unwrap();
        assert_eq!(apply_filters(&table, &unbounded).len(), 2);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let table = sample();
        let criteria = FilterCriteria::builder()
            .category("Orthopedics")
            .vendor("vendorb")
            .ppi_only(true)
            .build()
            .unwrap();
        let out = apply_filters(&table, &criteria);
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].amount, 250.0);
    }

    #[test]
    fn test_facility_matches_by_name_or_id() {
        let table = sample();
        let by_name = FilterCriteria::builder()
            .facility("Northside Community Hospital")
            .build()
            .unwrap();
        let by_id = FilterCriteria::builder()
            .facility("northside-community-hospital")
            .build()
            .unwrap();
        assert_eq!(apply_filters(&table, &by_name).len(), 2);
        assert_eq!(apply_filters(&table, &by_name), apply_filters(&table, &by_id));
    }

    #[test]
    fn test_contract_type_filter() {
        let table = sample();
        let criteria = FilterCriteria::builder()
            .contract_type("Off-Contract")
            .contract_type("GPO")
            .build()
            .unwrap();
        let out = apply_filters(&table, &criteria);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|t| t.contract_type != ContractType::Local));
    }

    #[test]
    fn test_every_returned_row_satisfies_predicates_and_is_idempotent() {
        let table = sample();
        let cases = [
            FilterCriteria::builder()
                .date_range(d("2024-01-01"), d("2024-03-10"))
                .category("Orthopedics")
                .category("Radiology"),
            FilterCriteria::builder().ppi_only(true),
            FilterCriteria::builder()
                .facility("Northside Community Hospital")
                .vendor("VendorB"),
            FilterCriteria::builder()
                .contract_type("Off-Contract")
                .facility("st-joseph-s-university-hospital"),
            FilterCriteria::builder().date_range(d("2022-01-01"), d("2022-12-31")),
        ];
        for builder in cases {
            let criteria = builder.build().unwrap();
            let once = apply_filters(&table, &criteria);
            assert!(once.iter().all(|t| criteria.matches(t)), "{criteria:?}");
            assert!(once.iter().all(|t| table.rows().contains(t)), "{criteria:?}");
            let rejected = table.iter().filter(|t| !criteria.matches(t)).count();
            assert_eq!(once.len() + rejected, table.len(), "{criteria:?}");
            assert_eq!(apply_filters(&once, &criteria), once, "{criteria:?}");
        }
    }

    #[test]
    fn test_range_outside_data_yields_empty_table() {
        let table = sample();
        let criteria = FilterCriteria::builder()
            .date_range(d("2022-01-01"), d("2022-12-31"))
            .build()
            .unwrap();
        assert!(apply_filters(&table, &criteria).is_empty());
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        let err = FilterCriteria::builder().from_date("2024-13-01").build().unwrap_err();
        assert_eq!(err, FilterError::InvalidDate("2024-13-01".to_string()));
        let err = FilterCriteria::builder().category("Cardiology").build().unwrap_err();
        assert_eq!(err, FilterError::UnknownCategory("Cardiology".to_string()));
        let err = FilterCriteria::builder().contract_type("Spot").build().unwrap_err();
        assert_eq!(err, FilterError::UnknownContractType("Spot".to_string()));
        let err = FilterCriteria::builder()
            .from_date("2024-05-01")
            .to_date("2024-04-01")
            .build()
            .unwrap_err();
        assert!(matches!(err, FilterError::InvertedRange { .. }));
    }

    #[test]
    fn test_filter_state_keeps_previous_on_error() {
        let mut state = FilterState::new();
        state
            .update(FilterCriteria::builder().category("Radiology"))
            .unwrap();
        let before = state.criteria().clone();
        let result = state.update(
            FilterCriteria::builder()
                .from_date("2024-05-01")
                .to_date("2024-04-01"),
        );
        assert!(result.is_err());
        assert_eq!(state.criteria(), &before);
        state.reset();
        assert_eq!(state.criteria(), &FilterCriteria::all());
    }

    #[test]
    fn test_active_filter_count() {
        let table = sample();
        assert_eq!(active_filter_count(&FilterCriteria::all(), &table), 0);

        let full_range = FilterCriteria::builder()
            .date_range(d("2023-01-01"), d("2025-01-01"))
            .build()
            .unwrap();
        assert_eq!(active_filter_count(&full_range, &table), 0);

        let narrowed = FilterCriteria::builder()
            .date_range(d("2024-02-01"), d("2024-03-31"))
            .vendor("VendorA")
            .ppi_only(true)
            .build()
            .unwrap();
        assert_eq!(active_filter_count(&narrowed, &table), 3);
    }
}
