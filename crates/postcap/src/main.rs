//! Postcap CLI
//!
//! Usage:
//!   postcap <domain> <collection_name> [OPTIONS]
//!
//! Point the client's HTTP proxy at the listen address; calls to the domain
//! (and its subdomains) are written to `<collection_name>.json`.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use postcap::proxy::ProxyServer;
use postcap::{CaptureConfig, CaptureStore, EventDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Capture API traffic for a domain into a Postman collection
#[derive(Parser, Debug)]
#[command(name = "postcap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target domain; subdomains are included (e.g. example.com)
    domain: Option<String>,

    /// Collection name, also the default output file name
    collection_name: Option<String>,

    /// Proxy listen port
    #[arg(short, long, env = "POSTCAP_PORT")]
    port: Option<u16>,

    /// Proxy listen address
    #[arg(long)]
    bind: Option<String>,

    /// Output file (default: <collection_name>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML config file; command-line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from an empty collection even if the output file exists
    #[arg(long)]
    no_resume: bool,

    /// Store Authorization header values instead of a variable
    #[arg(long)]
    keep_authorization: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> Result<CaptureConfig, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => CaptureConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => CaptureConfig::default(),
        };
        if let Some(domain) = self.domain {
            config.target_domain = domain;
        }
        if let Some(name) = self.collection_name {
            config.collection_name = name;
        }
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(bind) = self.bind {
            config.listen.host = bind;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        if self.no_resume {
            config.resume = false;
        }
        if self.keep_authorization {
            config.capture.redact_authorization = false;
        }
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.into_config()?;
    config.validate().context("invalid configuration")?;
    info!("host filter : {}", config.target_domain);
    info!("collection name : {}", config.collection_name);

    let normalizer = config.normalizer();
    let output = config.output_path();
    let store = if config.resume {
        CaptureStore::open(config.collection_name.trim(), &output, &normalizer)
            .with_context(|| format!("cannot resume from {}", output.display()))?
    } else {
        CaptureStore::new(config.collection_name.trim(), &output)
    };

    let dispatcher = Arc::new(EventDispatcher::new(
        config.domain_filter()?,
        normalizer,
        Arc::new(store),
    ));
    let server = ProxyServer::bind(config.listen.socket_addr()?, dispatcher)
        .await
        .context("failed to bind proxy listener")?;

    server
        .run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
}
