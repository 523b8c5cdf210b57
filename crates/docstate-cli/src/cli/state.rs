//! `dstate load` / `dstate save` -- read and write bot state.

use anyhow::{Context, Result, bail};
use console::style;
use docstate_core::keys::derive_keys;
use docstate_core::storage::BotStorage;
use docstate_types::data::{StatePartition, StorageData};
use serde_json::Value;

use super::ContextArgs;
use crate::state::AppState;

/// Bodies given on the command line, one per partition.
pub struct StateBodies {
    pub user_data: Option<String>,
    pub conversation_data: Option<String>,
    pub private_data: Option<String>,
}

impl StateBodies {
    fn parsed(&self) -> Result<Vec<(StatePartition, Value)>> {
        let mut bodies = Vec::new();
        for (partition, raw) in [
            (StatePartition::UserData, &self.user_data),
            (StatePartition::ConversationData, &self.conversation_data),
            (StatePartition::PrivateConversationData, &self.private_data),
        ] {
            if let Some(raw) = raw {
                bodies.push((partition, parse_body(partition, raw)?));
            }
        }
        Ok(bodies)
    }
}

/// Parse a state body; only JSON objects are accepted.
fn parse_body(partition: StatePartition, raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .with_context(|| format!("--{} is not valid JSON", flag_name(partition)))?;
    if !value.is_object() {
        bail!("--{} must be a JSON object", flag_name(partition));
    }
    Ok(value)
}

fn flag_name(partition: StatePartition) -> &'static str {
    match partition {
        StatePartition::UserData => "user-data",
        StatePartition::ConversationData => "conversation-data",
        StatePartition::PrivateConversationData => "private-data",
    }
}

pub async fn load(state: &AppState, args: &ContextArgs, json: bool) -> Result<()> {
    let context = args.to_context();
    let data = state
        .storage
        .load(&context)
        .await
        .context("Failed to load state")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if data.is_empty() {
        println!();
        println!(
            "  {} This context addresses no documents.",
            style("i").blue().bold(),
        );
        println!();
        return Ok(());
    }

    println!();
    for partition in StatePartition::ALL {
        if let Some(body) = data.get(partition) {
            println!("  {}", style(partition).cyan().bold());
            for line in serde_json::to_string_pretty(body)?.lines() {
                println!("    {line}");
            }
        }
    }
    println!();
    Ok(())
}

pub async fn save(
    state: &AppState,
    args: &ContextArgs,
    bodies: &StateBodies,
    json: bool,
) -> Result<()> {
    let context = args.to_context();
    let updates = bodies.parsed()?;

    let keys = derive_keys(&context);
    if keys.is_empty() {
        bail!("This context addresses no documents; pass --user and/or --conversation");
    }
    for (partition, _) in &updates {
        if keys.get(*partition).is_none() {
            bail!(
                "--{} given but this context does not address {partition}",
                flag_name(*partition)
            );
        }
    }

    // Start from the stored state so untouched partitions are rewritten as-is.
    let mut data: StorageData = state
        .storage
        .load(&context)
        .await
        .context("Failed to load current state")?;
    for (partition, body) in updates {
        data.set(partition, body);
    }

    state
        .storage
        .save(&context, &data)
        .await
        .context("Failed to save state")?;

    let written: Vec<&str> = keys.iter().map(|k| k.id.as_str()).collect();
    if json {
        let result = serde_json::json!({ "written": written });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        for id in written {
            println!("  {} Wrote '{}'", style("ok").green(), style(id).cyan());
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_body_accepts_objects() {
        let value = parse_body(StatePartition::UserData, r#"{"foo":{"bar":123}}"#).unwrap();
        assert_eq!(value, json!({"foo": {"bar": 123}}));
    }

    #[test]
    fn test_parse_body_rejects_non_objects() {
        let err = parse_body(StatePartition::ConversationData, "[1,2,3]").unwrap_err();
        assert!(err.to_string().contains("--conversation-data"));
        assert!(parse_body(StatePartition::UserData, "not json").is_err());
    }

    #[test]
    fn test_parsed_bodies_keep_partition() {
        let bodies = StateBodies {
            user_data: None,
            conversation_data: Some(r#"{"a":1}"#.to_string()),
            private_data: Some("{}".to_string()),
        };
        let parsed = bodies.parsed().unwrap();
        assert_eq!(
            parsed,
            vec![
                (StatePartition::ConversationData, json!({"a": 1})),
                (StatePartition::PrivateConversationData, json!({})),
            ]
        );
    }
}
