//! Activate command - promote the waiting generation

use super::{audit_activation, load_controller, save_controller};
use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::PrecacheResult;
use console::style;

/// Execute the activate command
pub async fn execute(config: &Config) -> PrecacheResult<()> {
    let mut controller = load_controller(config).await?;

    let activation = controller.activate().await?;
    save_controller(&controller, config).await?;
    audit_activation(&AuditLog::new(config), &activation).await;

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
