use crate::aggregate::Delta;

fn group_thousands(int_part: &str) -> String {
    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    with_commas.chars().rev().collect()
}

/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let negative = val < 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let with_commas = group_thousands(int_part);

    if negative {
        format!("-${with_commas}.{dec_part}")
    } else {
        format!("${with_commas}.{dec_part}")
    }
}

/// KPI-card style amount: $12.3M, $45.6K, $950.
pub fn money_compact(val: f64) -> String {
    if val >= 1_000_000.0 {
        format!("${:.1}M", val / 1_000_000.0)
    } else if val >= 1_000.0 {
        format!("${:.1}K", val / 1_000.0)
    } else {
        format!("${}", group_thousands(&format!("{:.0}", val.max(0.0))))
    }
}

pub fn thousands(n: usize) -> String {
    group_thousands(&n.to_string())
}

pub fn pct(val: f64) -> String {
    format!("{val:.1}%")
}

/// Signed percentage change, or "N/A" when there is no baseline.
pub fn delta(d: &Delta) -> String {
    match d.pct() {
        None => "N/A".to_string(),
        Some(p) if p > 0.0 => format!("+{p:.1}%"),
        Some(p) if p < 0.0 => format!("{p:.1}%"),
        Some(_) => "0.0%".to_string(),
    }
}
