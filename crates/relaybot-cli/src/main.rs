mod console;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relaybot", about = "Pluggable chat-bot command framework")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot with the console transport
    Run {
        /// Override the registry database path
        #[arg(long)]
        db: Option<std::path::PathBuf>,

        /// User ID to attribute console input to (defaults to the first
        /// configured owner)
        #[arg(long)]
        user: Option<String>,
    },
    /// Write a default configuration file to ~/.relaybot/config.json5
    Init,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { db, user } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(console::run(db, user))?;
        }
        Commands::Init => {
            let path = relaybot_config::config_file_path()?;
            if path.exists() {
                println!("Config already exists at {}", path.display());
            } else {
                relaybot_config::save_config(&relaybot_config::BotConfig::default())?;
                println!("Wrote default config to {}", path.display());
            }
        }
    }

    Ok(())
}
