use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mycelium::paths::WikiPaths;
use mycelium::{Wiki, config};

/// A git-backed personal wiki engine.
#[derive(Parser)]
#[command(name = "myceliumd", version)]
struct Cli {
    /// Path to the wiki root directory.
    wiki_dir: PathBuf,

    /// Rebuild the index and exit.
    #[arg(long)]
    reindex: bool,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run(cli) {
        tracing::error!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> mycelium::Result<()> {
    let paths = WikiPaths::new(&cli.wiki_dir);
    let cfg = config::load_or_init(&paths.config_toml());
    let grace = Duration::from_secs(cfg.network.shutdown_grace_secs.max(8));

    let wiki = Wiki::open(&cli.wiki_dir, cfg)?;
    tracing::info!(
        wiki_dir = %cli.wiki_dir.display(),
        hyphae = wiki.index.count(),
        users = wiki.users.count(),
        "wiki is up"
    );
    if cli.reindex {
        wiki.reindex()?;
        wiki.shutdown();
        wiki.wait();
        return Ok(());
    }

    let term = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&term)).map_err(mycelium::error::Error::Io)?;
    }
    while !term.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }
    tracing::info!("shutdown signal received");
    wiki.shutdown();

    // Give in-flight work a bounded window, then force the exit.
    std::thread::spawn(move || {
        std::thread::sleep(grace);
        tracing::error!("shutdown grace period expired, forcing exit");
        std::process::exit(1);
    });
    wiki.wait();
    Ok(())
}
