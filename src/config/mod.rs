pub mod schema;
pub mod store;

use crate::error::{DeckError, Result};
use schema::PluginConfig;
use std::path::Path;
use tracing::info;

/// Load and parse the plugin defaults from a TOML file.
///
/// # Errors
/// Returns `DeckError::ConfigNotFound` if the file doesn't exist,
/// `DeckError::Io` on read errors, `DeckError::TomlParse` on syntax errors,
/// or `DeckError::Config` on validation failures.
pub fn load(path: &Path) -> Result<PluginConfig> {
    if !path.exists() {
        return Err(DeckError::ConfigNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let content = expand_env_vars(&content);
    let config: PluginConfig = toml::from_str(&content)?;

    validate(&config)?;
    Ok(config)
}

/// Like [`load`], but a missing file yields the built-in defaults.
///
/// # Errors
/// Same as [`load`] for any failure other than the file being absent.
pub fn load_or_default(path: &Path) -> Result<PluginConfig> {
    match load(path) {
        Err(DeckError::ConfigNotFound(_)) => {
            info!("no defaults file at {}, using built-in defaults", path.display());
            Ok(PluginConfig::default())
        }
        other => other,
    }
}

/// Expand `${VAR}` and `$VAR` patterns in the config string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let var_name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    use std::fmt::Write;
                    let _ = write!(result, "${{{var_name}}}");
                }
            }
            continue;
        }

        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                var_name.push(c);
                chars.next();
            } else {
                break;
            }
        }

        if var_name.is_empty() {
            result.push('$');
        } else if let Ok(val) = std::env::var(&var_name) {
            result.push_str(&val);
        } else {
            result.push('$');
            result.push_str(&var_name);
        }
    }

    result
}

/// Validate config constraints.
fn validate(config: &PluginConfig) -> Result<()> {
    let plugin = &config.plugin;

    if !(250..=60_000).contains(&plugin.refresh_interval_ms) {
        return Err(DeckError::Config(
            "refresh_interval_ms must be 250-60000".to_string(),
        ));
    }

    if plugin.page_capacity < 3 {
        return Err(DeckError::Config(format!(
            "page_capacity {} leaves no room for devices (minimum 3)",
            plugin.page_capacity
        )));
    }

    if plugin.request_timeout_ms == 0 {
        return Err(DeckError::Config("request_timeout_ms must be positive".to_string()));
    }

    let stream = &config.stream;
    if stream.enabled && !(stream.url.starts_with("ws://") || stream.url.starts_with("wss://")) {
        return Err(DeckError::Config(format!(
            "stream url must use ws:// or wss://, got '{}'",
            stream.url
        )));
    }

    Ok(())
}
