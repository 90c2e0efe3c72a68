use std::path::Path;

use anyhow::Result;

use hoard_core::HarvestConfig;

use crate::ui;

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = HarvestConfig::load(config_path)?;
    let store = config.token_store();

    if store.clear()? {
        ui::success(&format!("Removed stored token {}", store.path().display()));
        ui::info("The next run will log in again.");
    } else {
        ui::info(&format!("No stored token at {}", store.path().display()));
    }
    Ok(())
}
