use clap::{Args, Parser, Subcommand};
use stats_scraper::app::ports::BrowserEnginePort;
use stats_scraper::config::{Config, InvocationOptions};
use stats_scraper::infra::chromium_engine;
use stats_scraper::infra::scripted_browser::ScriptedBrowser;
use stats_scraper::logging;
use stats_scraper::metrics::init_metrics;
use stats_scraper::trigger::{self, Capabilities, InvocationResponse};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "stats_scraper")]
#[command(about = "Renders a JavaScript stats page, extracts its table and delivers it as CSV")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML config file (defaults to ./scraper.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for rotated JSON logs
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct RunFlags {
    /// Page to render
    #[arg(long)]
    target_url: Option<String>,
    /// s3://bucket[/prefix], http(s) object-store URL, file:// URL or directory
    #[arg(long)]
    storage_destination: Option<String>,
    /// Budget for navigation plus readiness wait
    #[arg(long)]
    render_timeout_seconds: Option<u64>,
    /// Save a full-page screenshot once the page is ready
    #[arg(long)]
    screenshot: Option<PathBuf>,
    /// Serve this saved HTML instead of launching Chrome
    #[arg(long)]
    replay: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and print the invocation response
    Run {
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Handle a JSON invocation event (file path or '-' for stdin)
    Invoke {
        #[arg(long)]
        event: String,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Run the pipeline on a fixed interval until Ctrl-C
    Schedule {
        /// Seconds between run starts
        #[arg(long)]
        every: u64,
        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<u64>,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Load, validate and print the effective configuration
    CheckConfig {
        #[command(flatten)]
        flags: RunFlags,
    },
}

impl RunFlags {
    fn apply(&self, config: &mut Config) {
        config.apply_overrides(&InvocationOptions {
            target_url: self.target_url.clone(),
            storage_destination: self.storage_destination.clone(),
            render_timeout_seconds: self.render_timeout_seconds,
        });
        if let Some(path) = &self.screenshot {
            config.screenshot_path = Some(path.clone());
        }
    }

    async fn capabilities(&self, config: &Config) -> anyhow::Result<Capabilities> {
        let engine: Arc<dyn BrowserEnginePort> = match &self.replay {
            Some(path) => {
                let markup = tokio::fs::read_to_string(path).await?;
                info!("Replaying saved page {} instead of launching Chrome", path.display());
                Arc::new(ScriptedBrowser::serving(markup))
            }
            None => chromium_engine(config),
        };
        Ok(Capabilities::new(engine))
    }
}

fn read_event(source: &str) -> anyhow::Result<serde_json::Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source)?
    };
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(&raw)?)
}

fn print_response(response: &InvocationResponse) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { flags } => {
            flags.apply(&mut config);
            start_metrics(&config);
            let caps = flags.capabilities(&config).await?;
            let response = trigger::handle_invocation(&config, &serde_json::Value::Null, &caps).await;
            print_response(&response)
        }
        Commands::Invoke { event, flags } => {
            flags.apply(&mut config);
            start_metrics(&config);
            let event = read_event(&event)?;
            let caps = flags.capabilities(&config).await?;
            let response = trigger::handle_invocation(&config, &event, &caps).await;
            print_response(&response)
        }
        Commands::Schedule {
            every,
            max_runs,
            flags,
        } => {
            if every == 0 {
                anyhow::bail!("--every must be at least one second");
            }
            flags.apply(&mut config);
            config.validate()?;
            start_metrics(&config);
            let caps = flags.capabilities(&config).await?;
            let summary =
                trigger::schedule(&config, &caps, Duration::from_secs(every), max_runs).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::CheckConfig { flags } => {
            flags.apply(&mut config);
            config.validate()?;
            if config.storage_token.is_some() {
                config.storage_token = Some("<redacted>".to_string());
            }
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn start_metrics(config: &Config) {
    if let Some(addr) = config.metrics_addr {
        init_metrics(addr);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
