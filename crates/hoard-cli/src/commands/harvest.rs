use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use hoard_core::{run_harvest, HarvestConfig, HarvestMode};

use crate::ui::{self, DialoguerPrompter};

pub async fn run(channels: Option<Vec<String>>, limit: usize, config_path: Option<&Path>) -> Result<()> {
    let config = HarvestConfig::load(config_path)?;

    let mode = match channels {
        None => HarvestMode::AllChannels,
        Some(ids) => HarvestMode::Explicit(
            ids.into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        ),
    };

    match &mode {
        HarvestMode::AllChannels => ui::header(&format!("Harvesting all channels (limit {})", limit)),
        HarvestMode::Explicit(ids) => ui::header(&format!(
            "Harvesting {} channel(s): {} (limit {})",
            ids.len(),
            ids.join(", "),
            limit
        )),
    }

    let summary = run_harvest(&config, mode, limit, Arc::new(DialoguerPrompter)).await?;

    println!();
    ui::success(&format!(
        "{} channel(s) harvested, {} messages",
        summary.channels_processed, summary.messages
    ));
    if summary.channels_skipped > 0 {
        ui::info(&format!("{} channel(s) skipped, see the log above", summary.channels_skipped));
    }
    ui::info(&format!(
        "Media: {} saved, {} failed",
        summary.media_saved, summary.media_failed
    ));
    ui::info(&format!(
        "URLs: {} total (mega: {}, other: {})",
        summary.urls.total, summary.urls.mega, summary.urls.other
    ));
    ui::info(&format!("Output: {}", config.output_directory.display()));
    Ok(())
}
