//! Prune command - delete generations no longer in the lifecycle

use super::{load_controller, save_controller};
use crate::audit::{events, AuditLog};
use crate::cli::args::PruneArgs;
use crate::config::Config;
use crate::error::PrecacheResult;
use console::style;
use std::io::{self, Write};

/// Execute the prune command
pub async fn execute(args: PruneArgs, config: &Config) -> PrecacheResult<()> {
    let mut controller = load_controller(config).await?;
    let stale = controller.stale_generations().await?;

    if stale.is_empty() {
        println!("No stale generations.");
        return Ok(());
    }

    println!("Found {} stale generation(s):", stale.len());
    for generation in &stale {
        println!("  {} {}", style("•").red(), generation);
    }

    if args.dry_run {
        println!();
        println!("Dry run - no generations removed.");
        return Ok(());
    }

    if !args.yes {
        println!();
        print!("Remove them? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let result = controller.prune().await;
    // Deletions before a failure are already reflected in the snapshot
    save_controller(&controller, config).await?;
    let pruned = result?;

    let audit = AuditLog::new(config);
    for generation in &pruned {
        audit
            .log(
                events::GENERATION_PRUNED,
                &serde_json::json!({ "generation": generation.as_str() }),
            )
            .await;
    }

    println!(
        "{} removed {} generation(s)",
        style("✓").green(),
        pruned.len()
    );

    Ok(())
}
