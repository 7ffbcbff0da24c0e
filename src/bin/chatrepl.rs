use clap::Parser;
use chatrepl::{
    chat::{ChatClient, UserRef},
    config::ReplConfig,
    console::{ConsoleClient, ConsoleSession},
    evaluator::LiteralEvaluator,
    Error, ReplFeature,
};
use secrecy::SecretString;
use std::{path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep variables between lines
    #[arg(short, long)]
    retain: bool,

    /// Credential the console client pretends to authenticate with
    #[arg(long, env = "CHATREPL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let mut config = match &cli.config {
        Some(path) => ReplConfig::from_file(path)?,
        None => ReplConfig::default(),
    }
    .with_env_overrides();
    if cli.retain {
        config.flags.retain = true;
    }

    info!("config loaded.");
    debug!("config: {:?}", config);

    let me = UserRef {
        bot: true,
        ..UserRef::new(2, "chatrepl")
    };
    let client: Arc<dyn ChatClient> = Arc::new(ConsoleClient::new(
        me.clone(),
        cli.token.clone().map(SecretString::from),
    ));
    let mut session = ConsoleSession::new(client, me, UserRef::new(1, "operator"));
    let feature = ReplFeature::new(config);
    let evaluator = LiteralEvaluator::new();

    println!("chatrepl ready. `:retain on|off` toggles retention, `:quit` exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::internal(format!("Failed to read stdin: {}", e)))?
    {
        match line.trim() {
            "" => continue,
            ":quit" => break,
            ":retain on" | ":retain off" => {
                let retain = line.trim().ends_with("on");
                if feature.set_retention(retain).await {
                    println!("Variable retention is {}.", if retain { "ON" } else { "OFF" });
                } else {
                    println!("Variable retention is already set to {}.", retain);
                }
                continue;
            }
            _ => {}
        }

        let ctx = session.context(&line);
        if let Err(e) = feature.execute(&ctx, &evaluator, &line).await {
            eprintln!("Error: {}", e);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
