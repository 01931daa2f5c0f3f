use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

use crate::{
    model::{ListEntity, SelectedEntityAnswer},
    query::DEFAULT_TOP,
    service::Credentials,
    value_help::ValueHelpOptions,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_VALUE_HELP_DIR: &str = "webapp/localService";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub output_dir: PathBuf,
    #[serde(default = "default_top")]
    pub top: usize,
    pub list_entity: ListEntity,
    #[serde(default)]
    pub selections: Vec<SelectedEntityAnswer>,
    #[serde(default)]
    pub value_help: ValueHelpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    pub path: String,
    /// `sap-client` query parameter.
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueHelpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_value_help_dir")]
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub options: ValueHelpOptions,
}

impl Default for ValueHelpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: default_value_help_dir(),
            options: ValueHelpOptions::default(),
        }
    }
}

fn default_top() -> usize {
    DEFAULT_TOP
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_value_help_dir() -> PathBuf {
    PathBuf::from(DEFAULT_VALUE_HELP_DIR)
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(serde_yaml::from_str(contents)?)
}

pub async fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config = parse_config(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

pub fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Basic auth from `ODATA_USERNAME` / `ODATA_PASSWORD`, if both are set.
pub fn credentials_from_env() -> Option<Credentials> {
    let username = env::var("ODATA_USERNAME")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    let password = env::var("ODATA_PASSWORD").ok()?;
    Some(Credentials { username, password })
}
