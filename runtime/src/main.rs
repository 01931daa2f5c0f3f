use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use serde_json::Value;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use odata_mockdata::{
    config::{AppConfig, credentials_from_env, load_config},
    decompose, fetch_data,
    service::{HttpServiceProvider, QueryExecutor},
    storage::{JsonFileWriter, JsonFileWriterConfig, MockDataWriter},
    value_help::{RequestCache, ValueHelpSession},
};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = run().await {
        error!(error = %err, "Mock data generation failed");
        eprintln!("Mock data generation failed: {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<()> {
    init_tracing();
    if let Err(err) = dotenv() {
        debug!(error = %err, "No .env file loaded");
    }

    let config = load_config()
        .await
        .context("Failed to load application configuration")?;
    info!(
        base_url = %config.service.base_url,
        service_path = %config.service.path,
        list_entity = %config.list_entity.entity_set_name(),
        "Loaded configuration"
    );

    let provider = Arc::new(HttpServiceProvider::new(
        &config.service,
        credentials_from_env(),
    )?);
    let writer = JsonFileWriter::new(JsonFileWriterConfig {
        data_dir: config.output_dir.clone(),
        value_help_dir: config.value_help.output_dir.clone(),
    });

    let fetched = fetch_data(
        &config.list_entity,
        provider.as_ref(),
        &config.selections,
        config.top,
    )
    .await;
    if let Some(message) = fetched.result.error {
        return Err(anyhow!(message));
    }

    let raw = fetched.result.entity_data.unwrap_or(Value::Null);
    let data = decompose(
        &config.list_entity,
        &raw,
        &fetched.entity_sets_flat,
        &config.selections,
    );
    let written = writer.write_entity_data(&data).await?;
    info!(
        files = written.len(),
        records = data.record_count(),
        "Mock data written"
    );

    if config.value_help.enabled {
        generate_value_help(&config, provider, &writer).await?;
    }
    Ok(())
}

async fn generate_value_help(
    config: &AppConfig,
    provider: Arc<HttpServiceProvider>,
    writer: &JsonFileWriter,
) -> Result<()> {
    let metadata = provider
        .metadata()
        .await
        .context("Failed to fetch service metadata")?;

    let mut session = ValueHelpSession::new(
        provider.clone(),
        RequestCache::new(),
        config.value_help.options.clone(),
    );
    let choices = session.discover(provider.service_path(), &metadata)?.to_vec();
    if choices.is_empty() {
        info!("No value help references found");
        return Ok(());
    }

    session.select(&choices).await?;
    session.fetch_entity_data().await?;
    let written = writer.write_value_help(session.services()).await?;
    info!(
        services = session.services().len(),
        files = written.len(),
        "Value help data written"
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
