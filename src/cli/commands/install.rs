//! Install command - provision the manifest into a new generation

use super::{audit_activation, load_controller, save_controller};
use crate::audit::{events, AuditLog};
use crate::cache::{format_bytes, GenerationId};
use crate::cli::args::InstallArgs;
use crate::config::Config;
use crate::error::PrecacheResult;
use console::style;

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> PrecacheResult<()> {
    let generation = match args.generation {
        Some(name) => GenerationId::new(name)?,
        None => config.generation()?,
    };
    let manifest = config.manifest()?;
    let audit = AuditLog::new(config);
    let mut controller = load_controller(config).await?;

    println!(
        "Installing {} ({} resources from {})",
        style(&generation).cyan(),
        manifest.len(),
        config.controller.origin
    );

    audit
        .log(
            events::INSTALL_STARTED,
            &serde_json::json!({
                "generation": generation.as_str(),
                "origin": config.controller.origin,
                "entries": manifest.len(),
            }),
        )
        .await;

    let result = controller.install(generation.clone(), &manifest).await;
    // Persist InstallFailed too so `status` can report it
    save_controller(&controller, config).await?;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            audit
                .log(
                    events::INSTALL_FAILED,
                    &serde_json::json!({
                        "generation": generation.as_str(),
                        "error": e.to_string(),
                    }),
                )
                .await;
            return Err(e);
        }
    };

    audit
        .log(
            events::INSTALL_COMPLETED,
            &serde_json::json!({
                "generation": generation.as_str(),
                "entries": report.entries,
                "bytes": report.bytes,
            }),
        )
        .await;

    println!(
        "{} Installed {} ({} entries, {})",
        style("✓").green(),
        generation,
        report.entries,
        format_bytes(report.bytes)
    );

    if args.no_activate {
        println!(
            "Generation {} is waiting. Run: precache activate",
            style(&generation).cyan()
        );
        return Ok(());
    }

    let activation = controller.activate().await?;
    save_controller(&controller, config).await?;
    audit_activation(&audit, &activation).await;

    println!(
        "{} Activated {}",
        style("✓").green(),
        style(&activation.activated).cyan()
    );
    if let Some(previous) = &activation.superseded {
        println!("  superseded {}", previous);
    }
    for generation in &activation.pruned {
        println!("  pruned {}", generation);
    }

    Ok(())
}
