use anyhow::Context;
use bff_proxy::PipelineConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Load and validate a BFF modifier pipeline
#[derive(Parser, Debug)]
#[command(name = "bff-proxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline configuration file (YAML or JSON)
    #[arg(short, long, env = "BFF_PROXY_CONFIG")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
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
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = PipelineConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    info!("Loaded pipeline from {}", args.config.display());

    let boundary = config.build().context("failed to build pipeline")?;
    let stage = boundary.inner();
    info!(
        "Pipeline ready: root={}, request={}, response={}, timeout={}s, error_status={}",
        config.modifier.kind(),
        stage.request.is_some(),
        stage.response.is_some(),
        config.http.timeout_secs,
        config
            .error_status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "upstream".to_string())
    );
    Ok(())
}
