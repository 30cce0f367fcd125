//! main.rs — satellite runner entry point
//!
//! A runner is stateless between sessions: it binds the trainer's case set,
//! then trades `outcomes` for `population` batches until the connection
//! drops, backing off and rebinding as needed. With `--keep-replays` the
//! last N successful landings are written as JSON replays.

mod app;
mod client;
mod replay;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::app::App;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lander-runner",
    about = "A satellite client for the genetic algorithm-based Mars Lander trainer",
    disable_help_flag = true
)]
struct Args {
    /// Address of the machine where the trainer is running
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,

    /// TCP port the trainer accepts connections on
    #[arg(short, long, default_value_t = 12345)]
    port: u16,

    /// Keep the N last successful landing replays
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "1")]
    keep_replays: Option<usize>,

    /// Replays directory path
    #[arg(long, value_name = "path", default_value = ".")]
    replays_dir: PathBuf,

    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).unwrap_or(0) == 0 {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

/// Prepare the replays directory; offers to clear leftovers from an earlier
/// run so rotation counts stay meaningful.
fn setup_replays(args: &Args) -> Option<(PathBuf, usize)> {
    let count = args.keep_replays?.max(1);
    let dir = args.replays_dir.clone();

    println!(
        "Runner is configured to keep at most {count} replay(s) at '{}'",
        dir.display()
    );
    let leftovers = dir.is_dir()
        && std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
    if leftovers
        && confirm(&format!(
            "Replays directory '{}' is not empty;\nREMOVE all the contents AND PROCEED (y/[N])?",
            dir.display()
        ))
    {
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => println!("Cleared the replays directory."),
            Err(e) => eprintln!("Could not clear '{}': {e}", dir.display()),
        }
    }
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Could not create '{}': {e}", dir.display());
        return None;
    }
    Some((dir, count))
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lander_runner=info".into()),
        )
        .init();

    let args = Args::parse();
    let replays = setup_replays(&args);

    let client_name = format!("runner-{}", std::process::id());
    info!(
        "🛰  {client_name} targeting {}:{} (v{})",
        args.host,
        args.port,
        env!("CARGO_PKG_VERSION")
    );

    let mut app = App::new(&args.host, args.port, client_name, replays);
    app.run().await;
}
