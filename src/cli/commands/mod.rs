//! CLI command implementations
//!
//! Every command runs against the same on-disk host: generations under
//! `<root>/generations`, the controller registration in
//! `<root>/controller.json`.

pub mod activate;
pub mod config;
pub mod fetch;
pub mod install;
pub mod list;
pub mod prune;
pub mod status;

pub use activate::execute as activate;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use install::execute as install;
pub use list::execute as list;
pub use prune::execute as prune;
pub use status::execute as status;

use crate::audit::{events, AuditLog};
use crate::cache::{CacheStorage, DiskStorage};
use crate::config::Config;
use crate::controller::{Activation, Controller, ControllerSnapshot};
use crate::error::PrecacheResult;
use crate::network::HttpFetcher;
use std::sync::Arc;
use tracing::debug;

/// Disk-backed storage rooted at the configured storage root
pub(crate) fn open_storage(config: &Config) -> Arc<DiskStorage> {
    Arc::new(DiskStorage::new(config.storage_root()))
}

/// Load the registered controller, or register a fresh one
pub(crate) async fn load_controller(config: &Config) -> PrecacheResult<Controller> {
    let storage: Arc<dyn CacheStorage> = open_storage(config);
    let fetcher = Arc::new(HttpFetcher::new(
        config.controller.origin.clone(),
        &config.network,
    ));
    let options = config.controller_options();

    match ControllerSnapshot::load(&config.controller_state_path()).await? {
        Some(snapshot) => Controller::restore(storage, fetcher, options, snapshot).await,
        None => {
            debug!("No controller registered yet");
            Ok(Controller::new(storage, fetcher, options))
        }
    }
}

/// Persist the controller registration
pub(crate) async fn save_controller(controller: &Controller, config: &Config) -> PrecacheResult<()> {
    controller
        .snapshot()
        .save(&config.controller_state_path())
        .await
}

/// Audit the events an activation produced
pub(crate) async fn audit_activation(audit: &AuditLog, activation: &Activation) {
    if let Some(previous) = &activation.superseded {
        audit
            .log(
                events::GENERATION_SUPERSEDED,
                &serde_json::json!({
                    "generation": previous.as_str(),
                    "by": activation.activated.as_str(),
                }),
            )
            .await;
    }

    audit
        .log(
            events::GENERATION_ACTIVATED,
            &serde_json::json!({ "generation": activation.activated.as_str() }),
        )
        .await;

    for generation in &activation.pruned {
        audit
            .log(
                events::GENERATION_PRUNED,
                &serde_json::json!({ "generation": generation.as_str() }),
            )
            .await;
    }
}
