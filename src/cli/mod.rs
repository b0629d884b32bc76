pub mod entries;
pub mod journal;
pub mod lookup;
pub mod output;
pub mod projects;
pub mod summary;
pub mod tasks;
pub mod tracking;
pub mod watch;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use journal::{process_log_command, LogCommand};
use projects::{process_client_command, process_project_command, ClientCommand, ProjectCommand};
use summary::{process_summary_command, SummaryCommand};
use tasks::{process_task_command, TaskCommand};
use tracing::level_filters::LevelFilter;
use tracking::{process_focus_command, process_timer_command, FocusCommand, TimerCommand};

use crate::{
    app::App,
    utils::{
        clock::DefaultClock,
        dir::{create_application_default_path, ensure_dir},
        logging::enable_logging,
    },
};

#[derive(Parser, Debug)]
#[command(name = "chirp", version, long_about = None)]
#[command(about = "Billable time and focus session tracking that survives restarts", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default $XDG_STATE_HOME/chirp or $HOME/.local/state/chirp"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable verbose logging to the console")]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Manage clients")]
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },
    #[command(about = "Manage projects")]
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    #[command(about = "Billable timer")]
    Timer {
        #[command(subcommand)]
        command: TimerCommand,
    },
    #[command(about = "Focus sessions")]
    Focus {
        #[command(subcommand)]
        command: FocusCommand,
    },
    #[command(about = "Tasks and daily intentions")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    #[command(about = "Daily energy, mood and reflections")]
    Log {
        #[command(subcommand)]
        command: LogCommand,
    },
    #[command(about = "Show tracked time and earnings of a day")]
    Summary {
        #[command(flatten)]
        command: SummaryCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let application_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(&application_dir, logging_level, args.log)?;

    let mut app = App::open(&application_dir, Arc::new(DefaultClock)).await?;

    match args.commands {
        Commands::Client { command } => process_client_command(&app, command).await,
        Commands::Project { command } => process_project_command(&app, command).await,
        Commands::Timer { command } => process_timer_command(&mut app, command).await,
        Commands::Focus { command } => process_focus_command(&mut app, command).await,
        Commands::Task { command } => process_task_command(&app, command).await,
        Commands::Log { command } => process_log_command(&app, command).await,
        Commands::Summary { command } => process_summary_command(&app, command).await,
    }
}
