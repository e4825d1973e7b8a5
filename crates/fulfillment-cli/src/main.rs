mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use fulfillment_api::{ApiClient, Configuration, ReqwestClient};
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.env_dir {
        Some(dir) => Configuration::from_dir(dir)?,
        None => Configuration::from_env(),
    };
    if cli.no_store_token {
        config.set_store_token(false);
    }

    let mut builder = ApiClient::builder().config(config);
    if let Some(root) = &cli.storage_root {
        builder = builder.storage_root(root);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.http_client(ReqwestClient::with_timeout(Duration::from_secs(secs))?);
    }
    if cli.log_file {
        builder = builder.log_to_storage();
    }
    let client = builder.build().await?;

    match cli.command {
        Commands::Request {
            method,
            url,
            query,
            body,
        } => {
            let body = body
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("--body is not valid JSON")?;
            let query: Vec<(&str, &str)> = query
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();

            let result = client.request(&method, &url, body.as_ref(), &query).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Token => {
            let token = client.refresh_access_token().await?;
            println!("{token}");
        }
    }

    Ok(())
}
