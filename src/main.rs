use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use rba_rate_tracker::{api, monitoring, pipeline::Pipeline, types::AppConfig};

#[derive(Parser, Debug)]
#[command(name = "rba-rate-tracker")]
#[command(about = "Tracks market-implied probabilities for the next RBA cash rate decision", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, normalize and persist one snapshot
    Run {},
    /// Serve the persisted snapshot over HTTP
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Print the persisted snapshot with daily changes
    Show {},
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Run {} => "run",
            Commands::Serve { .. } => "serve",
            Commands::Show {} => "show",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "rba_rate_tracker=debug,tracker=debug,info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    tracing::debug!(target: "tracker", config = %cli.config, "loading config");

    let settings = AppConfig::from_file(&cli.config)?;
    tracing::info!(
        target: "tracker",
        config = %cli.config,
        timezone = settings.market.timezone.name(),
        state_path = %settings.storage.state_path.display(),
        "config loaded"
    );

    let command = cli.command.unwrap_or(Commands::Run {});
    monitoring::logger::log_startup(&settings, command.name());

    match command {
        Commands::Run {} => {
            let pipeline = Pipeline::from_config(&settings)?;
            let report = pipeline.run_cycle().await?;
            tracing::info!(
                target: "tracker",
                source = %report.snapshot.source,
                strategy = report.strategy.unwrap_or("none"),
                next_meeting = %report.snapshot.next_meeting,
                outcomes = report.snapshot.outcomes.len(),
                degradations = ?report.degradations,
                changes = %report.delta,
                "run finished"
            );
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            api::serve(&settings, &bind).await?;
        }
        Commands::Show {} => {
            let view = api::ReadService::from_config(&settings).current_view();
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}
