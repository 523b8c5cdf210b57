//! `dstate init` -- force provisioning of the database and collection.

use anyhow::{Context, Result};
use console::style;

use crate::state::AppState;

pub async fn init(state: &AppState, json: bool) -> Result<()> {
    let storage = &state.storage;
    storage
        .ensure_initialized()
        .await
        .context("Failed to initialize storage")?;

    let spec = storage.collection_spec();
    if json {
        let result = serde_json::json!({
            "status": storage.init_status().to_string(),
            "database": storage.links().database(),
            "collection": storage.links().collection(),
            "partitioned": storage.config().is_partitioned(),
            "default_ttl": spec.default_ttl,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Storage ready at '{}'",
        style("ok").green(),
        style(storage.links().collection()).cyan(),
    );
    println!(
        "     Partitioned: {}   TTL: {}",
        if storage.config().is_partitioned() {
            style("yes").green()
        } else {
            style("no").dim()
        },
        match spec.default_ttl {
            Some(secs) => format!("{secs}s"),
            None => "disabled".to_string(),
        },
    );
    println!();
    Ok(())
}
