pub mod demo;
pub mod export;
pub mod init;
pub mod options;
pub mod report;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::Result;
use crate::filter::{FilterCriteria, FilterCriteriaBuilder, FilterState};
use crate::loader::TableCache;
use crate::models::Table;
use crate::settings::{load_settings, resolve_data_path, Settings, DATA_ENV_VAR};

#[derive(Parser)]
#[command(name = "spendlens", about = "Healthcare procurement spend analytics.", version)]
pub struct Cli {
    /// Transaction CSV (default: $SPENDLENS_DATA, then the saved setting)
    #[arg(long, global = true)]
    pub data: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Filter flags shared by every analytical command.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Start date: YYYY-MM-DD (inclusive)
    #[arg(long = "from")]
    pub from_date: Option<String>,
    /// End date: YYYY-MM-DD (inclusive)
    #[arg(long = "to")]
    pub to_date: Option<String>,
    /// Facility name or id (repeatable)
    #[arg(long = "facility")]
    pub facilities: Vec<String>,
    /// Spend category, e.g. 'Orthopedics' (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,
    /// Vendor name (repeatable)
    #[arg(long = "vendor")]
    pub vendors: Vec<String>,
    /// Contract type: GPO, Local, Off-Contract (repeatable)
    #[arg(long = "contract-type")]
    pub contract_types: Vec<String>,
    /// Only physician preference items
    #[arg(long = "ppi-only")]
    pub ppi_only: bool,
}

impl FilterArgs {
    pub fn builder(&self, bounds: Option<(NaiveDate, NaiveDate)>) -> FilterCriteriaBuilder {
        let mut b = FilterCriteria::builder().within(bounds).ppi_only(self.ppi_only);
        if let Some(from) = &self.from_date {
            b = b.from_date(from);
        }
        if let Some(to) = &self.to_date {
            b = b.to_date(to);
        }
        for f in &self.facilities {
            b = b.facility(f.as_str());
        }
        for c in &self.categories {
            b = b.category(c.as_str());
        }
        for v in &self.vendors {
            b = b.vendor(v.as_str());
        }
        for ct in &self.contract_types {
            b = b.contract_type(ct.as_str());
        }
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    /// Headline KPIs with prior-period deltas
    Kpis,
    /// Spend by category
    Categories,
    /// Monthly spend trend
    Monthly,
    /// Top vendors by spend
    Vendors,
    /// Every vendor's share of total spend
    Concentration,
    /// Spend by facility and PPI mix
    Facilities,
    /// Contract type mix by category
    Contracts,
    /// Categories with high off-contract spend
    Opportunities,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Full dashboard: KPI cards plus every summary table.
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Show a single dashboard section.
    Report {
        #[arg(value_enum)]
        section: Section,
        #[command(flatten)]
        filters: FilterArgs,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Number of vendors to show (default from settings)
        #[arg(long)]
        top: Option<usize>,
        /// Off-contract percentage that flags a category (default from settings)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Export filtered transactions as CSV.
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<String>,
    },
    /// List filtered transactions, newest first.
    Detail {
        #[command(flatten)]
        filters: FilterArgs,
        /// Maximum rows to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Show the dataset's date range and filter values.
    Options,
    /// Write a synthetic procurement dataset to explore the tool.
    Demo {
        /// Output path (default: the configured data path)
        #[arg(long)]
        output: Option<String>,
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Save the data file location to settings.
    Init {
        /// Path to the transaction CSV
        path: String,
    },
}

/// Loaded dataset plus the settings it was resolved with. Each command opens
/// its own session, so the cache and filter state live for one invocation;
/// longer-lived callers keep a `TableCache` and `FilterState` themselves.
pub(crate) struct Session {
    pub path: PathBuf,
    pub settings: Settings,
    pub table: Arc<Table>,
}

impl Session {
    pub fn open(data: Option<&str>) -> Result<Self> {
        let settings = load_settings();
        let path = resolve_data_path(data, std::env::var(DATA_ENV_VAR).ok(), &settings);
        let mut cache = TableCache::new();
        let table = cache.get(&path)?;
        Ok(Self { path, settings, table })
    }

    /// Validate filter flags against the loaded table.
    pub fn criteria(&self, filters: &FilterArgs) -> Result<FilterCriteria> {
        let mut state = FilterState::new();
        let criteria = state.update(filters.builder(self.table.date_bounds()))?;
        Ok(criteria.clone())
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let data = cli.data.as_deref();
    match cli.command {
        Commands::Summary { filters, json } => report::summary(data, &filters, json),
        Commands::Report {
            section,
            filters,
            json,
            top,
            threshold,
        } => report::section(data, section, &filters, json, top, threshold),
        Commands::Export { filters, output } => export::run(data, &filters, output.as_deref()),
        Commands::Detail { filters, limit } => export::detail(data, &filters, limit),
        Commands::Options => options::run(data),
        Commands::Demo { output, seed } => demo::run(data, output.as_deref(), seed),
        Commands::Init { path } => init::run(&path),
    }
}
