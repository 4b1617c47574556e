//! `artifact-switcher` entry point.

use std::path::PathBuf;

use anyhow::Context;
use switcher_server::{App, Server, SwitcherConfig};
use switcher_telemetry::init_telemetry;

struct Args {
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("artifact-switcher {}", switcher_server::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Artifact Switcher - serve the artifact bound to an environment

USAGE:
    artifact-switcher [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    ARTIFACT_SWITCHER_LISTEN_ADDR     Bind address (default: 0.0.0.0)
    ARTIFACT_SWITCHER_LISTEN_PORT     Listen port (default: 4000)
    ARTIFACT_SWITCHER_FETCH_TIMEOUT   Upstream fetch timeout in seconds (default: 30)
    ARTIFACT_SWITCHER_LOG_LEVEL       Log filter, e.g. info or switcher_middleware=debug
    ARTIFACT_SWITCHER_LOG_FORMAT      json or pretty (default: json)

EXAMPLES:
    artifact-switcher --config /etc/artifact-switcher/config.toml
    ARTIFACT_SWITCHER_LISTEN_PORT=8080 artifact-switcher
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SwitcherConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SwitcherConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("invalid configuration")?;

    init_telemetry(&config.log_config(), &config.metrics_config())
        .context("failed to initialize telemetry")?;

    tracing::info!(
        version = switcher_server::VERSION,
        config = ?args.config,
        "starting artifact switcher"
    );

    let app = App::from_config(&config)?;
    let server = Server::bind(app, &config).await?;
    server.run().await?;

    Ok(())
}
