use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use console::style;

use hoard_core::{connect, list_channels, Channel, ChannelKind, HarvestConfig};

use crate::ui::{self, DialoguerPrompter};

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = HarvestConfig::load(config_path)?;
    config.validate()?;
    let guild_id = config.require_server_id()?.to_string();

    let (session, credential) = connect(&config, Arc::new(DialoguerPrompter)).await?;

    let spinner = ui::spinner("Fetching channels...");
    let listed = list_channels(&session, &credential, &guild_id).await;
    spinner.finish_and_clear();
    let channels = listed?;

    ui::header(&format!("{} channels in server {}", channels.len(), guild_id));
    print_table(&channels);

    let threaded: Vec<&Channel> = channels
        .iter()
        .filter(|c| c.kind() == ChannelKind::ThreadBased)
        .collect();
    if !threaded.is_empty() {
        ui::header("Forum / media channels");
        for channel in &threaded {
            ui::info(&format!(
                "{}  {} ({})",
                style(&channel.id).cyan(),
                channel.name,
                channel.channel_type.display_name()
            ));
        }
    }

    if let Some(example) = channels.iter().find(|c| c.is_harvestable()) {
        println!();
        ui::info("Harvest specific channels with:");
        println!("    hoard harvest --channels {}", example.id);
    }
    Ok(())
}

fn print_table(channels: &[Channel]) {
    let rows: Vec<[String; 4]> = channels
        .iter()
        .map(|c| {
            [
                c.id.clone(),
                c.name.clone(),
                c.channel_type.display_name(),
                c.parent_name.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let headers = ["ID", "NAME", "TYPE", "CATEGORY"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| {
        format!(
            "  {:<w0$} | {:<w1$} | {:<w2$} | {}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        )
    };

    println!("{}", style(line(headers)).bold());
    println!("  {}", "-".repeat(widths.iter().sum::<usize>() + 9));
    for row in &rows {
        println!("{}", line([&row[0], &row[1], &row[2], &row[3]]));
    }
}
