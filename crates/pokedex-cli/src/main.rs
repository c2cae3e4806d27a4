//! pokedexcli - an interactive Pokédex for the terminal.
//!
//! Explore PokeAPI locations, catch Pokémon, and keep your collection in a
//! save file that survives crashes and concurrent sessions.

mod app;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use pokedex_core::{ApiClient, Config, FileStore, ResponseCache, SharedState};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{App, Command};

// ============================================================================
// Constants
// ============================================================================

const PROMPT: &str = "Pokedex > ";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=pokedex_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    info!("pokedexcli starting");

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });

    let cache = ResponseCache::new(config.cache_ttl());
    let api = ApiClient::new(cache)
        .context("Failed to build HTTP client")?
        .with_base_url(config.api_base_url.as_str());

    // A save file that cannot be read is never replaced with an empty one.
    let save_path = config.save_file_path();
    let state = SharedState::load(FileStore::new(&save_path), config.auto_save())
        .with_context(|| format!("Could not load Pokédex from {}", save_path.display()))?;

    let app = App::new(api, state);
    let result = run_repl(&app).await;

    info!("pokedexcli shutting down");
    result
}

async fn run_repl(app: &App) -> Result<()> {
    let count = app.state().with_read(|state| state.pokedex.len());
    println!("Welcome to the Pokédex! You have caught {} Pokémon.", count);
    println!("Type 'help' for a list of commands.");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", PROMPT);
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            // EOF behaves like `exit` so nothing is lost.
            println!();
            print!("{}", app.execute(Command::Exit).await?.output);
            return Ok(());
        };
        let line = line.context("Failed to read input")?;

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match app.execute(command).await {
            Ok(outcome) => {
                print!("{}", outcome.output);
                if outcome.quit {
                    return Ok(());
                }
            }
            Err(e) => println!("Error: {:#}", e),
        }
    }
}
