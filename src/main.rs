//! Binary entrypoint for the Questroom CLI.
//!
//! Commands:
//! - `play` - interactive terminal client
//! - `init` - write a starter `questroom.toml`
//! - `status` - validate the remembered session and print counters
//!
//! See the library crate docs for module-level details: `questroom::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use questroom::api::{GameApi, HttpApi};
use questroom::client::GameClient;
use questroom::config::Config;
use questroom::metrics;
use questroom::session::{SessionContext, SessionStore};
use questroom::terminal;

#[derive(Parser)]
#[command(name = "questroom")]
#[command(about = "Terminal client for narrator-driven multiplayer rooms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "questroom.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive client
    Play,
    /// Write a default configuration file
    Init,
    /// Check the remembered session and show counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            println!("Wrote {}", cli.config);
        }
        Commands::Play => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting questroom v{}", env!("CARGO_PKG_VERSION"));
            let api = HttpApi::new(&config.server);
            terminal::run(GameClient::new(config, api)).await?;
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            show_status(&config).await?;
        }
    }
    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    println!("Questroom status");
    println!("  backend: {}", config.server.base_url);
    let api = HttpApi::new(&config.server);
    match api.list_rooms().await {
        Ok(rooms) => println!("  backend reachable, {} open room(s)", rooms.len()),
        Err(e) => println!("  backend unreachable: {}", e),
    }
    if config.session.remember {
        let session = SessionContext::new(Some(SessionStore::new(&config.session.file)));
        match session.restore(&api).await {
            Ok(Some(who)) => println!("  remembered session: {} (valid)", who),
            Ok(None) => println!("  remembered session: none"),
            Err(e) => println!("  remembered session: could not validate ({})", e),
        }
    } else {
        println!("  remembered session: disabled");
    }
    let m = metrics::snapshot();
    println!(
        "  sync ok={} failed={} accepted={} suppressed={}",
        m.sync_ok, m.sync_failed, m.events_accepted, m.events_suppressed
    );
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    match log_file.and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    }) {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // The REPL owns the terminal; only echo records when stderr is not the console.
            let echo = !atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}: {}", ts, record.level(), record.target(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if echo {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
