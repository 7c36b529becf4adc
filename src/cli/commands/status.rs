//! Status command - show the controller lifecycle

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::config::Config;
use crate::controller::{ControllerSnapshot, GenerationLifecycle, LifecycleState};
use crate::error::PrecacheResult;
use console::style;

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> PrecacheResult<()> {
    let Some(snapshot) = ControllerSnapshot::load(&config.controller_state_path()).await? else {
        match args.format {
            OutputFormat::Json => println!("null"),
            _ => println!("No controller registered. Run: precache install"),
        }
        return Ok(());
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Table | OutputFormat::Plain => print_status(&snapshot, config),
    }

    Ok(())
}

fn print_status(snapshot: &ControllerSnapshot, config: &Config) {
    println!("{}", style("Controller").bold());
    println!("  Registration: {}", snapshot.registration_id);
    println!(
        "  Registered:   {}",
        snapshot.registered_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Origin:       {}", config.controller.origin);
    println!();

    println!("{}", style("Generations").bold());
    match &snapshot.active {
        Some(active) => print_lifecycle("Active:", active),
        None => println!("  {:<14}{}", "Active:", style("none").dim()),
    }
    match &snapshot.pending {
        Some(pending) => print_lifecycle("Pending:", pending),
        None => println!("  {:<14}{}", "Pending:", style("none").dim()),
    }

    if !snapshot.superseded.is_empty() {
        let names: Vec<&str> = snapshot.superseded.iter().map(|g| g.as_str()).collect();
        println!("  {:<14}{}", "Superseded:", names.join(", "));
    }
}

fn print_lifecycle(label: &str, lifecycle: &GenerationLifecycle) {
    println!(
        "  {:<14}{} [{}] since {}",
        label,
        style(&lifecycle.generation).cyan(),
        state_display(lifecycle.state),
        lifecycle.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(err) = &lifecycle.last_error {
        println!("  {:<14}{}", "", style(err).red());
    }
}

fn state_display(state: LifecycleState) -> String {
    match state {
        LifecycleState::Active => style(state).green().to_string(),
        LifecycleState::WaitingToActivate | LifecycleState::Installing => {
            style(state).yellow().to_string()
        }
        LifecycleState::InstallFailed => style(state).red().to_string(),
        LifecycleState::Unregistered | LifecycleState::Superseded => {
            style(state).dim().to_string()
        }
    }
}
