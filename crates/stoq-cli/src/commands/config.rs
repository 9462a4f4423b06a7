//! Config command handlers

use anyhow::{bail, Context, Result};

use stoq_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "api_url": config.api_url,
                    "auth_token_set": config.auth_token.is_some(),
                    "health_path": config.health_path,
                    "probe_interval_secs": config.probe_interval_secs,
                    "probe_timeout_ms": config.probe_timeout_ms,
                    "request_timeout_secs": config.request_timeout_secs,
                    "max_retries": config.max_retries,
                    "reconnect_debounce_ms": config.reconnect_debounce_ms,
                    "replay_gap_ms": config.replay_gap_ms,
                    "housekeeping_interval_secs": config.housekeeping_interval_secs,
                    "sync_on_start": config.sync_on_start
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:                   {}", config.data_dir.display());
            println!(
                "  api_url:                    {}",
                config.api_url.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  auth_token:                 {}",
                if config.auth_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!("  health_path:                {}", config.health_path);
            println!("  probe_interval_secs:        {}", config.probe_interval_secs);
            println!("  probe_timeout_ms:           {}", config.probe_timeout_ms);
            println!("  request_timeout_secs:       {}", config.request_timeout_secs);
            println!("  max_retries:                {}", config.max_retries);
            println!("  reconnect_debounce_ms:      {}", config.reconnect_debounce_ms);
            println!("  replay_gap_ms:              {}", config.replay_gap_ms);
            println!("  housekeeping_interval_secs: {}", config.housekeeping_interval_secs);
            println!("  sync_on_start:              {}", config.sync_on_start);
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    match key.as_str() {
        "data_dir" => {
            config.data_dir = value.clone().into();
        }
        "api_url" => {
            config.api_url = optional(&value);
        }
        "auth_token" => {
            config.auth_token = optional(&value);
        }
        "health_path" => {
            config.health_path = value.clone();
        }
        "probe_interval_secs" => {
            config.probe_interval_secs = value
                .parse()
                .context("Invalid value for probe_interval_secs. Use a number of seconds.")?;
        }
        "probe_timeout_ms" => {
            config.probe_timeout_ms = value
                .parse()
                .context("Invalid value for probe_timeout_ms. Use a number of milliseconds.")?;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a number of seconds.")?;
        }
        "max_retries" => {
            config.max_retries = value
                .parse()
                .context("Invalid value for max_retries. Use a whole number.")?;
        }
        "reconnect_debounce_ms" => {
            config.reconnect_debounce_ms = value
                .parse()
                .context("Invalid value for reconnect_debounce_ms. Use a number of milliseconds.")?;
        }
        "replay_gap_ms" => {
            config.replay_gap_ms = value
                .parse()
                .context("Invalid value for replay_gap_ms. Use a number of milliseconds.")?;
        }
        "housekeeping_interval_secs" => {
            config.housekeeping_interval_secs = value
                .parse()
                .context("Invalid value for housekeeping_interval_secs. Use a number of seconds.")?;
        }
        "sync_on_start" => {
            config.sync_on_start = value
                .parse()
                .context("Invalid value for sync_on_start. Use 'true' or 'false'.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, api_url, auth_token, health_path,\n\
                 probe_interval_secs, probe_timeout_ms, request_timeout_secs,\n\
                 max_retries, reconnect_debounce_ms, replay_gap_ms,\n\
                 housekeeping_interval_secs, sync_on_start",
                key
            );
        }
    }

    config.save().context("Failed to save configuration")?;

    // Don't echo secrets back
    if key == "auth_token" {
        output.success(&format!(
            "Set {} = {}",
            key,
            if config.auth_token.is_some() {
                "(set)"
            } else {
                "(cleared)"
            }
        ));
    } else {
        output.success(&format!("Set {} = {}", key, value));
    }

    Ok(())
}

/// Empty string or "none" clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_clears_on_empty_and_none() {
        assert_eq!(optional(""), None);
        assert_eq!(optional("none"), None);
        assert_eq!(optional("https://api.example.com"), Some("https://api.example.com".to_string()));
    }
}
