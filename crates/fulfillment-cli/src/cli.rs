use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fulfillment", version, about = "Call the Fulfillment API from the command line")]
pub struct Cli {
    /// Directory containing a .env file (defaults to the process environment)
    #[arg(short, long, env = "FULFILLMENT_ENV_DIR")]
    pub env_dir: Option<PathBuf>,

    /// Where the access token and log files are kept
    #[arg(short, long, env = "FULFILLMENT_STORAGE")]
    pub storage_root: Option<PathBuf>,

    /// Do not read or write the access token file
    #[arg(long, default_value_t = false)]
    pub no_store_token: bool,

    /// Give up on a request after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also write logs to <storage>/logs
    #[arg(long, default_value_t = false)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Call an endpoint and print the JSON response
    Request {
        /// HTTP method (get, post, put, patch, delete)
        method: String,

        /// URL relative to the API endpoint
        url: String,

        /// Query parameter as key=value, repeatable
        #[arg(short, long = "query", value_parser = parse_pair)]
        query: Vec<(String, String)>,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Request a new access token and print it
    Token,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}
