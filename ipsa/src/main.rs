use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use ipsa::server::{self, DEFAULT_LISTEN_ADDR, DEFAULT_TLS_DIR, ServerConfig};
use ipsa::{AdmissionPolicy, Config};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Mutating admission webhook managing image pull secrets and pod security defaults
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "IPSA_CONFIG", default_value = ipsa::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to serve the webhook on
    #[arg(long, env = "IPSA_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Directory containing tls.crt and tls.key
    #[arg(long, env = "IPSA_TLS_DIR", default_value = DEFAULT_TLS_DIR)]
    tls_dir: PathBuf,

    /// Log output format
    #[arg(long, env = "IPSA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let pipeline = config.pipeline().context("invalid configuration")?;

    tracing::info!(
        config = %cli.config.display(),
        application = ?config.application,
        rules = pipeline.rules().len(),
        exempt = ?config.exempt_namespaces,
        security_defaults = config.security_defaults,
        "configuration loaded"
    );

    if cli.check_config {
        return Ok(());
    }

    let policies: Vec<Box<dyn AdmissionPolicy>> = vec![Box::new(pipeline)];
    let server_config = ServerConfig {
        listen: cli.listen,
        tls_dir: cli.tls_dir,
    };

    server::run(server_config, Arc::new(policies)).await?;

    Ok(())
}
