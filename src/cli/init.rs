use std::path::Path;

use crate::error::Result;
use crate::loader::load_transactions;
use crate::settings::{load_settings, save_settings, settings_path, shellexpand_path};

/// Validate the file loads, then remember it as the default data path.
pub fn run(path: &str) -> Result<()> {
    let expanded = shellexpand_path(path);
    let data_path = std::fs::canonicalize(&expanded).unwrap_or_else(|_| Path::new(&expanded).to_path_buf());
    let table = load_transactions(&data_path)?;

    let mut settings = load_settings();
    settings.data_path = Some(data_path.to_string_lossy().into_owned());
    save_settings(&settings)?;

    println!("Using {} ({} transactions).", data_path.display(), table.len());
    println!("Settings saved to {}", settings_path().display());
    Ok(())
}
