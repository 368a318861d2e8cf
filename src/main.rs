use std::panic;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use taskboard::{
    cli::{self, RootCommand},
    logging::{init_logging, print_log_location},
    session::{SessionContext, SessionStore},
    settings::Settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "taskboard",
    about = "Command-line client for the task board API",
    long_about = "Log in to a task board server, then list, create, update, move, advance, delete and export tasks. `config` shows or changes the saved settings.",
    version = env!("TASKBOARD_BUILD_VERSION"),
    author
)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: RootCommand,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = match init_logging() {
        Ok(path) => Some(path),
        Err(err) => {
            eprintln!("warning: failed to initialize logging: {err}");
            None
        }
    };
    if let Some(path) = log_path.as_ref() {
        install_panic_hook_with_log(path.clone());
    }

    let cli = Cli::parse();
    let json_output = cli.json;
    let code = run_cli(cli).await;

    if code != 0
        && !json_output
        && let Some(path) = log_path.as_ref()
    {
        print_log_location(path);
    }
    std::process::exit(code);
}

async fn run_cli(cli: Cli) -> i32 {
    let settings = Settings::load();

    let session = match SessionStore::default_path() {
        Some(path) => SessionContext::with_store(SessionStore::new(path)),
        None => {
            tracing::warn!("no local data directory; session will not be kept between runs");
            SessionContext::new()
        }
    };
    session.restore();

    cli::run(&settings, session, cli.command, cli.json, cli.quiet).await
}

fn install_panic_hook_with_log(log_path: PathBuf) {
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        eprintln!();
        print_log_location(&log_path);
        eprintln!();
        previous_hook(panic_info);
    }));
}
