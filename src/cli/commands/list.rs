//! List command - show stored cache generations

use super::open_storage;
use crate::cache::{format_bytes, CacheStorage, GenerationInfo, GenerationState};
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::controller::ControllerSnapshot;
use crate::error::PrecacheResult;
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> PrecacheResult<()> {
    let generations = open_storage(config).list().await?;
    let snapshot = ControllerSnapshot::load(&config.controller_state_path())
        .await?
        .unwrap_or_default();

    let rows: Vec<(GenerationInfo, String)> = generations
        .into_iter()
        .map(|info| {
            let role = role_of(&info, &snapshot);
            (info, role)
        })
        .collect();

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Plain => print_plain(&rows),
    }

    Ok(())
}

/// Where a stored generation sits in the controller lifecycle
fn role_of(info: &GenerationInfo, snapshot: &ControllerSnapshot) -> String {
    let lifecycle = snapshot
        .active
        .iter()
        .chain(snapshot.pending.iter())
        .find(|l| l.generation == info.id);

    match lifecycle {
        Some(l) => l.state.to_string(),
        None if snapshot.superseded.contains(&info.id) => "superseded".to_string(),
        None => "stale".to_string(),
    }
}

fn print_table(rows: &[(GenerationInfo, String)]) {
    if rows.is_empty() {
        println!("No cache generations found.");
        return;
    }

    println!(
        "{:<24} {:<10} {:<20} {:>8} {:>10} {:<16}",
        "GENERATION", "STORE", "ROLE", "ENTRIES", "SIZE", "CREATED"
    );
    println!("{}", "-".repeat(93));

    for (info, role) in rows {
        let state_name = info.state.to_string();
        let state = match info.state {
            GenerationState::Complete => style(state_name.as_str()).green(),
            GenerationState::Building => style(state_name.as_str()).yellow(),
        };
        let role_display = match role.as_str() {
            "active" => style(role.as_str()).green().bold(),
            "stale" | "superseded" => style(role.as_str()).dim(),
            _ => style(role.as_str()).yellow(),
        };

        // Pad on visible width; escape codes would skew `{:<}`
        println!(
            "{:<24} {} {} {:>8} {:>10} {:<16}",
            info.id.as_str(),
            pad(state.to_string(), state_name.len(), 10),
            pad(role_display.to_string(), role.len(), 20),
            info.entry_count,
            format_bytes(info.size_bytes),
            info.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("Total: {} generation(s)", rows.len());
}

fn pad(styled: String, visible: usize, width: usize) -> String {
    format!("{}{}", styled, " ".repeat(width.saturating_sub(visible)))
}

fn print_json(rows: &[(GenerationInfo, String)]) -> PrecacheResult<()> {
    #[derive(serde::Serialize)]
    struct GenerationJson<'a> {
        #[serde(flatten)]
        info: &'a GenerationInfo,
        role: &'a str,
    }

    let json: Vec<GenerationJson> = rows
        .iter()
        .map(|(info, role)| GenerationJson { info, role })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(rows: &[(GenerationInfo, String)]) {
    for (info, _) in rows {
        println!("{}", info.id);
    }
}
