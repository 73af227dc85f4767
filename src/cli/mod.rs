pub mod daemon_path;
pub mod output;
pub mod process;
pub mod range;
pub mod stats;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use stats::{
    process_clear_command, process_history_command, process_stats_command, HistoryCommand,
    StatsCommand,
};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{collection::feed::report_url, config::TrackerConfig, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "dwell", version, long_about = None)]
#[command(about = "Tracks which application or web page has your attention", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for debugging"
    )]
    Serve {},
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Show how much time went to each site and application")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Show recorded sessions, newest first")]
    History {
        #[command(flatten)]
        command: HistoryCommand,
    },
    #[command(about = "Delete all recorded sessions")]
    Clear {},
    #[command(about = "Tell the daemon which page the browser shows")]
    ReportUrl {
        #[arg(long)]
        url: String,
        #[arg(long)]
        title: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match &args.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(args.dir),
        Commands::Stop {} => {
            let stopped = kill_previous_servers()?;
            println!("Stopped {stopped} daemons");
            Ok(())
        }
        Commands::Serve {} => start_daemon(app_dir).await,
        Commands::Stats { command } => process_stats_command(&app_dir, command).await,
        Commands::History { command } => process_history_command(&app_dir, command).await,
        Commands::Clear {} => process_clear_command(&app_dir).await,
        Commands::ReportUrl { url, title } => {
            let config = TrackerConfig::load(&app_dir)?;
            report_url(config.feed_address.as_str(), &url, title.as_deref()).await?;
            println!("Reported {url}");
            Ok(())
        }
    }
}
