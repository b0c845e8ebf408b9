//! Command execution against a cache store

use anyhow::{Context, Result};
use serde_json::{json, Value};
use stash_store::{expand_cache_key, CacheOptions, CacheStore, KeyPart};
use std::time::Duration;
use tracing::debug;

use crate::cli::Commands;

/// Interpret a command-line value: JSON when it parses, a plain string otherwise
pub fn parse_value(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

/// Interpret a key component, recognising integers and booleans
pub fn parse_key_part(input: &str) -> KeyPart {
    if let Ok(int) = input.parse::<i64>() {
        return KeyPart::Int(int);
    }
    match input {
        "true" => KeyPart::Bool(true),
        "false" => KeyPart::Bool(false),
        _ => KeyPart::Str(input.to_string()),
    }
}

/// Expand key components the way every store does
pub fn expand_key(parts: &[String], namespace: Option<&str>) -> String {
    let key = KeyPart::List(parts.iter().map(|part| parse_key_part(part)).collect());
    expand_cache_key(&key, namespace)
}

/// Run one command and return its printable result
pub async fn execute<S: CacheStore>(store: &S, command: &Commands) -> Result<Value> {
    debug!(backend = store.backend_name(), command = ?command, "executing command");

    let output = match command {
        Commands::Read { key, raw } => {
            let options = if *raw {
                CacheOptions::new().raw()
            } else {
                CacheOptions::new()
            };
            store
                .read(key, &options)
                .await
                .with_context(|| format!("failed to read '{}'", key))?
                .map(|value| value.into_value())
                .unwrap_or(Value::Null)
        }
        Commands::Write {
            key,
            value,
            raw,
            expires_in,
            unless_exist,
        } => {
            let mut options = CacheOptions::new();
            if *raw {
                options = options.raw();
            }
            if *unless_exist {
                options = options.unless_exist();
            }
            if let Some(seconds) = expires_in {
                options = options.expires_in(Duration::from_secs(*seconds));
            }
            let written = store
                .write(key, parse_value(value), &options)
                .await
                .with_context(|| format!("failed to write '{}'", key))?;
            json!(written)
        }
        Commands::Delete { key } => {
            let deleted = store
                .delete(key, &CacheOptions::new())
                .await
                .with_context(|| format!("failed to delete '{}'", key))?;
            json!(deleted)
        }
        Commands::Exist { key } => json!(store.exist(key, &CacheOptions::new()).await?),
        Commands::Increment { key, by } => {
            json!(store.increment(key, *by, &CacheOptions::new()).await?)
        }
        Commands::Decrement { key, by } => {
            json!(store.decrement(key, *by, &CacheOptions::new()).await?)
        }
        Commands::Clear => {
            store.clear().await.context("failed to clear store")?;
            json!(true)
        }
        Commands::ExpandKey { parts, namespace } => {
            json!(expand_key(parts, namespace.as_deref()))
        }
    };

    Ok(output)
}
