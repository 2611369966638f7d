use std::path::PathBuf;

use chrono::{Datelike, Duration, NaiveDate};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::aggregate::calculate_kpis;
use crate::error::{Result, SpendError};
use crate::fmt::{money, pct, thousands};
use crate::loader::export_transactions;
use crate::models::{slugify, Category, ContractType, Table, Transaction};
use crate::settings::{load_settings, resolve_data_path, DATA_ENV_VAR};

const FACILITIES: &[(&str, f64)] = &[
    ("Memorial Regional Medical Center", 1.35),
    ("St. Joseph's University Hospital", 1.15),
    ("Valley Health System - Main Campus", 1.0),
    ("Northside Community Hospital", 0.65),
    ("Riverside General Hospital", 0.85),
];

struct CategoryProfile {
    category: Category,
    target_spend: f64,
    target_txns: usize,
    ppi_rate: f64,
    /// GPO, Local, Off-Contract
    contract_weights: [f64; 3],
    vendors: &'static [(&'static str, f64)],
    /// (description, low unit price, high unit price)
    products: &'static [(&'static str, f64, f64)],
}

const PROFILES: &[CategoryProfile] = &[
    CategoryProfile {
        category: Category::Orthopedics,
        target_spend: 12_500_000.0,
        target_txns: 1100,
        ppi_rate: 0.95,
        contract_weights: [0.45, 0.35, 0.20],
        vendors: &[
            ("Stryker", 0.22),
            ("DePuy Synthes", 0.20),
            ("Zimmer Biomet", 0.18),
            ("Smith+Nephew", 0.15),
            ("Medtronic", 0.10),
            ("Arthrex", 0.08),
            ("Globus Medical", 0.04),
            ("NuVasive", 0.03),
        ],
        products: &[
            ("Primary Total Hip System", 4500.0, 8500.0),
            ("Primary Total Knee System", 4200.0, 7800.0),
            ("Thoracolumbar Pedicle Screw Set", 1800.0, 3800.0),
            ("Locking Plate System - Distal Radius", 800.0, 1800.0),
            ("Reverse Shoulder System", 5200.0, 9800.0),
            ("Bone Cement (40g)", 120.0, 350.0),
        ],
    },
    CategoryProfile {
        category: Category::BiomedicalEquipment,
        target_spend: 10_000_000.0,
        target_txns: 550,
        ppi_rate: 0.10,
        contract_weights: [0.50, 0.35, 0.15],
        vendors: &[
            ("GE Healthcare", 0.25),
            ("Philips", 0.22),
            ("Siemens Healthineers", 0.20),
            ("Agiliti", 0.15),
            ("Medtronic", 0.10),
            ("BD", 0.08),
        ],
        products: &[
            ("Patient Monitor - Bedside", 3500.0, 8500.0),
            ("Infusion Pump - Dual Channel", 2800.0, 6200.0),
            ("Ventilator - ICU", 18000.0, 35000.0),
            ("Defibrillator - Biphasic", 8000.0, 16000.0),
            ("Electrosurgical Unit", 4500.0, 9500.0),
        ],
    },
    CategoryProfile {
        category: Category::SurgicalSupplies,
        target_spend: 7_500_000.0,
        target_txns: 1400,
        ppi_rate: 0.05,
        contract_weights: [0.70, 0.20, 0.10],
        vendors: &[
            ("Cardinal Health", 0.25),
            ("BD", 0.20),
            ("Teleflex", 0.15),
            ("B.Braun", 0.15),
            ("Baxter", 0.12),
            ("Medtronic", 0.08),
            ("Boston Scientific", 0.05),
        ],
        products: &[
            ("Surgical Drape Pack", 45.0, 120.0),
            ("Laparoscopic Trocar Set", 180.0, 420.0),
            ("Suture - Absorbable (box)", 90.0, 240.0),
            ("Surgical Stapler - Linear", 350.0, 780.0),
        ],
    },
    CategoryProfile {
        category: Category::BiologicsWoundCare,
        target_spend: 6_000_000.0,
        target_txns: 700,
        ppi_rate: 0.65,
        contract_weights: [0.45, 0.35, 0.20],
        vendors: &[
            ("Integra LifeSciences", 0.22),
            ("Smith+Nephew", 0.18),
            ("ConvaTec", 0.16),
            ("Molnlycke", 0.15),
            ("KCI (3M+KCI)", 0.14),
            ("Medtronic", 0.08),
            ("Baxter", 0.07),
        ],
        products: &[
            ("Dermal Regeneration Template", 1200.0, 3200.0),
            ("Negative Pressure Wound Therapy Kit", 350.0, 900.0),
            ("Amniotic Membrane Allograft", 900.0, 2600.0),
            ("Foam Dressing (box)", 60.0, 180.0),
        ],
    },
    CategoryProfile {
        category: Category::Radiology,
        target_spend: 5_000_000.0,
        target_txns: 450,
        ppi_rate: 0.05,
        contract_weights: [0.55, 0.30, 0.15],
        vendors: &[
            ("GE Healthcare", 0.28),
            ("Philips", 0.25),
            ("Siemens Healthineers", 0.22),
            ("Hologic", 0.15),
            ("Canon Medical", 0.10),
        ],
        products: &[
            ("Contrast Media - Iodinated (case)", 800.0, 2200.0),
            ("Ultrasound Transducer", 4500.0, 12000.0),
            ("Digital Radiography Detector", 15000.0, 38000.0),
            ("Mammography Compression Paddle", 600.0, 1500.0),
        ],
    },
    CategoryProfile {
        category: Category::ClinicalEngineeringServices,
        target_spend: 4_000_000.0,
        target_txns: 400,
        ppi_rate: 0.02,
        contract_weights: [0.40, 0.45, 0.15],
        vendors: &[
            ("Sodexo", 0.30),
            ("Agiliti", 0.25),
            ("GE Healthcare", 0.20),
            ("Philips", 0.15),
            ("Siemens Healthineers", 0.10),
        ],
        products: &[
            ("Preventive Maintenance - Imaging", 4000.0, 12000.0),
            ("Service Contract - Infusion Fleet", 6000.0, 18000.0),
            ("Equipment Repair - Time & Materials", 800.0, 4500.0),
        ],
    },
    CategoryProfile {
        category: Category::Vascular,
        target_spend: 3_000_000.0,
        target_txns: 500,
        ppi_rate: 0.55,
        contract_weights: [0.50, 0.30, 0.20],
        vendors: &[
            ("Boston Scientific", 0.25),
            ("Medtronic", 0.22),
            ("Abbott", 0.20),
            ("Teleflex", 0.15),
            ("BD", 0.10),
            ("B.Braun", 0.08),
        ],
        products: &[
            ("Drug-Eluting Stent", 1200.0, 2600.0),
            ("Peripheral Balloon Catheter", 350.0, 900.0),
            ("Vascular Closure Device", 180.0, 420.0),
            ("Guidewire - Hydrophilic", 60.0, 160.0),
        ],
    },
    CategoryProfile {
        category: Category::OtherMiscellaneous,
        target_spend: 2_000_000.0,
        target_txns: 500,
        ppi_rate: 0.02,
        contract_weights: [0.65, 0.25, 0.10],
        vendors: &[
            ("Cardinal Health", 0.30),
            ("BD", 0.20),
            ("Baxter", 0.15),
            ("B.Braun", 0.15),
            ("Teleflex", 0.10),
            ("Sodexo", 0.10),
        ],
        products: &[
            ("Exam Gloves - Nitrile (case)", 35.0, 95.0),
            ("Isolation Gown (case)", 55.0, 150.0),
            ("Wheelchair - Standard", 350.0, 850.0),
            ("IV Pole - Rolling", 120.0, 320.0),
        ],
    },
];

/// Monthly price multiplier, January first.
const SEASONALITY: [f64; 12] = [1.08, 1.05, 1.06, 1.02, 1.00, 0.98, 0.90, 0.92, 1.00, 1.03, 1.01, 0.95];

fn weighted(weights: impl IntoIterator<Item = f64>) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(weights).map_err(|e| SpendError::Other(format!("invalid demo weights: {e}")))
}

fn pick_quantity(rng: &mut StdRng, category: Category) -> Result<u32> {
    let (values, weights): (Vec<u32>, Vec<f64>) = match category {
        Category::SurgicalSupplies | Category::OtherMiscellaneous => {
            let w = [20., 15., 12., 10., 8., 6., 5., 4., 3., 3., 2., 2.];
            ((1..=12).collect(), w.to_vec())
        }
        Category::BiomedicalEquipment | Category::ClinicalEngineeringServices => {
            ((1..=5).collect(), vec![60., 20., 10., 5., 5.])
        }
        _ => ((1..=9).collect(), vec![40., 20., 15., 10., 5., 4., 3., 2., 1.]),
    };
    Ok(values[weighted(weights)?.sample(rng)])
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Two years (2024–2025) of synthetic transactions, scaled per category to
/// the target spend and sorted by date.
pub fn generate(seed: u64) -> Result<Table> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .ok_or_else(|| SpendError::Other("invalid demo start date".into()))?;
    let days = 731;

    let facility_dist = weighted(FACILITIES.iter().map(|f| f.1))?;
    let mut rows: Vec<Transaction> = Vec::new();

    for profile in PROFILES {
        let vendor_dist = weighted(profile.vendors.iter().map(|v| v.1))?;
        let contract_dist = weighted(profile.contract_weights)?;
        let mut cat_rows: Vec<Transaction> = Vec::with_capacity(profile.target_txns);

        for _ in 0..profile.target_txns {
            let date = start + Duration::days(rng.gen_range(0..days));
            let seasonality = SEASONALITY[date.month0() as usize];
            let facility = FACILITIES[facility_dist.sample(&mut rng)].0;
            let vendor = profile.vendors[vendor_dist.sample(&mut rng)].0;
            let &(product, low, high) = profile
                .products
                .choose(&mut rng)
                .ok_or_else(|| SpendError::Other("category without products".into()))?;
            let quantity = pick_quantity(&mut rng, profile.category)?;
            let contract_type = ContractType::ALL[contract_dist.sample(&mut rng)];

            let mut unit_price = round2(rng.gen_range(low..high) * seasonality);
            if contract_type == ContractType::OffContract {
                unit_price = round2(unit_price * rng.gen_range(1.15..1.30));
            }

            cat_rows.push(Transaction {
                transaction_id: String::new(),
                date,
                facility_id: slugify(facility),
                facility_name: facility.to_string(),
                department: profile.category.label().to_string(),
                category: profile.category,
                vendor: vendor.to_string(),
                product_description: product.to_string(),
                unit_price,
                quantity,
                amount: round2(unit_price * quantity as f64),
                contract_type,
                is_ppi: rng.gen::<f64>() < profile.ppi_rate,
            });
        }

        let generated: f64 = cat_rows.iter().map(|t| t.amount).sum();
        if generated > 0.0 {
            let scale = profile.target_spend / generated;
            for t in &mut cat_rows {
                t.unit_price = round2(t.unit_price * scale);
                t.amount = round2(t.unit_price * t.quantity as f64);
            }
        }
        rows.extend(cat_rows);
    }

    rows.sort_by_key(|t| t.date);
    for (i, t) in rows.iter_mut().enumerate() {
        t.transaction_id = format!("TXN-{}", 100_001 + i);
    }
    Ok(Table::new(rows))
}

pub fn run(data: Option<&str>, output: Option<&str>, seed: u64) -> Result<()> {
    let path = match output {
        Some(p) => PathBuf::from(p),
        None => resolve_data_path(data, std::env::var(DATA_ENV_VAR).ok(), &load_settings()),
    };
    let table = generate(seed)?;
    export_transactions(&table, &path)?;

    let kpis = calculate_kpis(&table);
    println!("Generated {} rows in {}", thousands(table.len()), path.display());
    println!("Total spend: {}", money(kpis.total_spend));
    if let Some((min, max)) = table.date_bounds() {
        println!("Date range: {min} to {max}");
    }
    println!("Facilities: {}", table.facilities().len());
    println!("Vendors: {}", kpis.vendor_count);
    println!("PPI spend: {}", pct(kpis.ppi_spend_pct));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_transactions;

    #[test]
    fn test_generate_is_deterministic_per_seed() {
        let a = generate(7).unwrap();
        let b = generate(7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generate(8).unwrap());
    }

    #[test]
    fn test_generate_shape() {
        let table = generate(42).unwrap();
        let expected: usize = PROFILES.iter().map(|p| p.target_txns).sum();
        assert_eq!(table.len(), expected);
        assert_eq!(table.categories().len(), 8);
        assert_eq!(table.facilities().len(), FACILITIES.len());
        assert!(table.rows().windows(2).all(|w| w[0].date <= w[1].date));
        assert!(table.iter().all(|t| t.amount >= 0.0));
        let (min, max) = table.date_bounds().unwrap();
        assert!(min >= NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(max <= NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());

        let total = calculate_kpis(&table).total_spend;
        let target: f64 = PROFILES.iter().map(|p| p.target_spend).sum();
        assert!((total - target).abs() / target < 0.01, "total {total} vs target {target}");
    }

    #[test]
    fn test_generated_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.csv");
        let table = generate(1).unwrap();
        export_transactions(&table, &path).unwrap();
        assert_eq!(load_transactions(&path).unwrap().len(), table.len());
    }
}
