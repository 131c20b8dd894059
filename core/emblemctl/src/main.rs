//! emblemctl: diagnostic CLI for the Emblem status channel.
//!
//! Asks the synchronization service the same questions the shell extension
//! asks, from the command line. Useful when a badge looks wrong: `status`
//! and `health` bypass the cache entirely, while `badge` runs the real
//! handler pipeline (cache, query client, icon theme) for one path.

mod probe;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use emblem_core::{
    FileAttributes, IconOverlayIdentifier, Membership, OverlayConfig, OverlayRuntime,
};

#[derive(Parser)]
#[command(name = "emblemctl")]
#[command(about = "Emblem sync-status probe")]
#[command(version)]
struct Cli {
    /// Socket path of the synchronization service (defaults to the
    /// bootstrap-published endpoint)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the service for one path's state, bypassing the cache
    Status {
        /// Absolute path to query
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Service health snapshot
    Health,

    /// Evaluate the full overlay pipeline for one path, as the shell would
    Badge {
        /// Absolute path to evaluate
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// How long to wait for the refresh to land, in milliseconds
        #[arg(long, default_value_t = 2_000)]
        wait_ms: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = cli.socket.as_deref();

    let result = match cli.command {
        Commands::Status { path } => run_status(socket, &path),
        Commands::Health => run_health(socket),
        Commands::Badge { path, wait_ms } => run_badge(socket, &path, wait_ms),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "emblemctl failed");
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run_status(socket: Option<&Path>, path: &Path) -> emblem_core::Result<()> {
    let state = probe::query_status(socket, path)?;
    println!("{}: {:?}", path.display(), state);
    Ok(())
}

fn run_health(socket: Option<&Path>) -> emblem_core::Result<()> {
    let data = probe::query_health(socket)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
    );
    Ok(())
}

fn run_badge(socket: Option<&Path>, path: &Path, wait_ms: u64) -> emblem_core::Result<()> {
    let runtime =
        OverlayRuntime::init_with_endpoint(OverlayConfig::load(), socket.map(Path::to_path_buf));
    let handler = runtime.new_handler();

    // First poll arms the refresh, then wait for the cache to fill the way
    // the shell's repaint loop would.
    let deadline = Instant::now() + Duration::from_millis(wait_ms);
    let mut verdict = handler.is_member_of(path, FileAttributes::default());
    while verdict == Membership::NotMember && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(25));
        verdict = handler.is_member_of(path, FileAttributes::default());
    }

    match handler.overlay_info(path) {
        Some(info) => println!(
            "{}: badge {} in {}",
            path.display(),
            info.icon_index,
            info.image_file.display()
        ),
        None => println!("{}: no overlay", path.display()),
    }

    if !runtime.service_reachable() {
        tracing::warn!("status channel is degraded; answer is best-effort");
    }
    Ok(())
}
