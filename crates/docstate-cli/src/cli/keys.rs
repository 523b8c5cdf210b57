//! `dstate keys` -- show which documents a context addresses.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use docstate_core::keys::derive_keys;

use super::ContextArgs;
use crate::state::AppState;

pub fn keys(state: &AppState, args: &ContextArgs, json: bool) -> Result<()> {
    let keys = derive_keys(&args.to_context());

    if json {
        let entries: Vec<_> = keys
            .iter()
            .map(|k| {
                serde_json::json!({
                    "partition": k.partition.field_name(),
                    "id": k.id,
                    "link": state.storage.links().document(&k.id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if keys.is_empty() {
        println!();
        println!(
            "  {} This context addresses no documents.",
            style("i").blue().bold(),
        );
        println!("     Pass --user and/or --conversation.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Partition").fg(Color::White),
        Cell::new("Document Id").fg(Color::White),
    ]);
    for key in keys.iter() {
        table.add_row(vec![
            Cell::new(key.partition).fg(Color::Cyan),
            Cell::new(&key.id),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
