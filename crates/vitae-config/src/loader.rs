use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::VitaeConfig;

/// Resolve the config path: explicit path > VITAE_CONFIG env > ./vitae.toml
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var("VITAE_CONFIG") {
        return PathBuf::from(p);
    }
    PathBuf::from("vitae.toml")
}

/// Whether the process runs with the production hardening rules.
pub fn is_production() -> bool {
    std::env::var("VITAE_ENV").is_ok_and(|e| e == "production")
}

/// Load the config from disk, apply env overrides, and validate.
///
/// Happens exactly once at startup; the resulting value is passed explicitly
/// to each component at construction.
pub fn load(path: Option<&Path>) -> vitae_core::Result<VitaeConfig> {
    let config_path = resolve_path(path);
    let config = if config_path.exists() {
        info!(?config_path, "loading configuration");
        let raw = std::fs::read_to_string(&config_path)?;
        toml::from_str::<VitaeConfig>(&raw).map_err(|e| {
            vitae_core::VitaeError::Config(format!(
                "failed to parse {}: {}",
                config_path.display(),
                e
            ))
        })?
    } else {
        warn!(?config_path, "config file not found, using defaults");
        VitaeConfig::default()
    };

    let config = apply_env_overrides(config);

    match config.validate(is_production()) {
        Ok(warnings) => {
            for w in &warnings {
                warn!("{}", w);
            }
        }
        Err(e) => {
            return Err(vitae_core::VitaeError::Config(e));
        }
    }

    Ok(config)
}

/// Apply env var overrides. Credentials in the config file take priority;
/// env vars fill in when the file leaves them unset.
fn apply_env_overrides(mut config: VitaeConfig) -> VitaeConfig {
    if let Ok(v) = std::env::var("VITAE_SERVER_HOST") {
        config.server.host = v;
    }
    if let Ok(v) = std::env::var("VITAE_SERVER_PORT") {
        if let Ok(port) = v.parse::<u16>() {
            config.server.port = port;
        }
    }
    if let Ok(v) = std::env::var("VITAE_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Ok(v) = std::env::var("VITAE_DB_PATH") {
        config.storage.db_path = PathBuf::from(v);
    }
    if config.providers.anthropic_api_key.is_none() {
        if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
            config.providers.anthropic_api_key = Some(v);
        }
    }
    if config.providers.openai_api_key.is_none() {
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            config.providers.openai_api_key = Some(v);
        }
    }
    if config.embedding.api_key.is_none() {
        if let Ok(v) = std::env::var("VITAE_EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(v);
        }
    }
    config
}
