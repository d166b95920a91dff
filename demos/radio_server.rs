//! Internet radio station streaming a music directory
//!
//! Run with: cargo run --example radio_server [MUSIC_PATH]
//!
//! Configuration comes from the environment:
//!   PORT        port to listen on (default: 8000)
//!   MUSIC_PATH  directory scanned for .mp3 files (default: ./music)
//!   NAME        station name sent as icy-name
//!   GENRE       station genre sent as icy-genre
//!
//! A path given on the command line overrides MUSIC_PATH. Subdirectories of
//! the music path become track categories, shown as the stream url in the
//! now-playing metadata.
//!
//! ## Listening
//!
//! With VLC:
//!   vlc http://localhost:8000/
//!
//! With ffplay:
//!   ffplay -icy 1 http://localhost:8000/
//!
//! With curl (raw stream, no metadata):
//!   curl -s http://localhost:8000/ > capture.mp3

use std::path::PathBuf;
use std::time::Duration;

use radiocast::{BroadcastEngine, DirectoryCatalog, EngineConfig, RadioServer, RestartPolicy};
use radiocast::{StationConfig, StationMonitor};

/// How often the station status is printed
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

fn print_usage() {
    eprintln!("Usage: radio_server [MUSIC_PATH]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PORT         Port to listen on (default: 8000)");
    eprintln!("  MUSIC_PATH   Directory with .mp3 files (default: ./music)");
    eprintln!("  NAME         Station name");
    eprintln!("  GENRE        Station genre");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("radiocast=info".parse()?)
                .add_directive("radio_server=info".parse()?),
        )
        .init();

    let mut station = StationConfig::from_env();
    if let Some(path) = args.get(1) {
        station.music_path = PathBuf::from(path);
    }

    if !station.music_path.is_dir() {
        eprintln!("Error: {} is not a directory", station.music_path.display());
        eprintln!();
        print_usage();
        std::process::exit(1);
    }

    println!("Starting {} ({})", station.name, station.genre);
    println!("Music:  {}", station.music_path.display());
    println!("Listen: http://localhost:{}/", station.port);
    println!();

    let config = EngineConfig::default().restart(RestartPolicy::default());
    let engine = BroadcastEngine::with_config(config);

    let monitor = StationMonitor::new();
    let _monitor_task = monitor.spawn(engine.subscribe());

    engine.start(DirectoryCatalog::new(station.music_path.clone()))?;

    let server = RadioServer::new(station.server_config(), engine.clone());

    let status = tokio::spawn({
        let monitor = monitor.clone();
        async move {
            let mut interval = tokio::time::interval(STATUS_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                println!("{}", monitor.status());
            }
        }
    });

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    status.abort();
    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    println!("{}", monitor.status());

    Ok(())
}
