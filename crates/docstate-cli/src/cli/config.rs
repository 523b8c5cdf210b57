//! `dstate config` -- show (and optionally persist) the effective configuration.

use anyhow::{Context, Result};
use console::style;
use docstate_infra::config::write_storage_config;

use crate::state::AppState;

pub async fn config(state: &AppState, write: bool, json: bool) -> Result<()> {
    let config = &state.config;
    let written = if write {
        Some(
            write_storage_config(&state.data_dir, config)
                .await
                .context("Failed to write config.toml")?,
        )
    } else {
        None
    };

    if json {
        let result = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "backend_root": config.backend.root_dir(&state.data_dir).display().to_string(),
            "partitioned": config.storage.is_partitioned(),
            "max_concurrency": config.storage.max_concurrency(),
            "config": config,
            "written": written.as_ref().map(|p| p.display().to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let storage = &config.storage;
    println!();
    println!("  {}", style("── Storage ──").dim());
    println!("  Database:    {}", style(&storage.database_name).cyan());
    println!("  Collection:  {}", style(&storage.collection_name).cyan());
    println!(
        "  Throughput:  {} ({})",
        storage.collection_throughput,
        if storage.is_partitioned() {
            "partitioned on /id"
        } else {
            "unpartitioned"
        }
    );
    println!(
        "  TTL:         {}",
        match storage.default_ttl {
            Some(secs) => format!("{secs}s"),
            None => "disabled".to_string(),
        }
    );
    println!("  Fan-out:     {}", storage.max_concurrency());
    println!("  On failure:  {:?}", storage.init_failure);
    println!();
    println!("  {}", style("── Backend ──").dim());
    println!("  Kind:        {:?}", config.backend.kind);
    println!(
        "  Root:        {}",
        config.backend.root_dir(&state.data_dir).display()
    );
    println!("  Data dir:    {}", state.data_dir.display());
    if let Some(path) = written {
        println!();
        println!(
            "  {} Wrote {}",
            style("ok").green(),
            style(path.display()).cyan()
        );
    }
    println!();
    Ok(())
}
