//! meshproxy command-line tool
//!
//! Subcommands:
//! - `identity` - create or show a persistent mesh identity
//! - `route`    - show where a URL would be sent
//! - `fetch`    - perform a GET/POST through the tunnel

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meshproxy")]
#[command(version, about = "HTTP over an identity-addressed mesh", long_about = None)]
pub struct Cli {
    /// Client config file (default: ~/.meshproxy/client.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or show a persistent identity
    Identity {
        /// Identity name under ~/.meshproxy
        #[arg(short, long, default_value = "meshproxy-gateway")]
        name: String,

        /// Explicit identity file, overrides --name
        #[arg(long)]
        path: Option<PathBuf>,

        /// Only show an existing identity, never create one
        #[arg(long)]
        show: bool,
    },

    /// Show which gateway a URL maps to
    Route {
        url: String,
    },

    /// Send a request through the tunnel and print the body
    Fetch {
        url: String,

        #[arg(short = 'X', long, value_enum, default_value_t = HttpMethod::Get)]
        method: HttpMethod,

        /// Query parameter `key=value`, repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Header `name=value`, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Cookie `name=value`, repeatable
        #[arg(long = "cookie")]
        cookies: Vec<String>,

        /// Form field `key=value`, repeatable
        #[arg(short, long = "data")]
        data: Vec<String>,

        /// JSON body
        #[arg(short, long)]
        json: Option<String>,

        /// Request token to use instead of a generated one
        #[arg(long)]
        req_id: Option<String>,

        /// Seconds to wait for the reply
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Identity { name, path, show } => {
            commands::identity::handle(&name, path, show)?;
        }
        Commands::Route { url } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::fetch::route(&config, &url);
        }
        Commands::Fetch {
            url,
            method,
            params,
            headers,
            cookies,
            data,
            json,
            req_id,
            timeout,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let request = commands::fetch::FetchRequest {
                url,
                method,
                params,
                headers,
                cookies,
                data,
                json,
                req_id,
                timeout,
            };
            commands::fetch::handle(&config, request).await?;
        }
    }

    Ok(())
}
