//! respot-fetch — entry point.
//!
//! ```text
//! respot-fetch <track-id> <file-id>          Download with the default config
//! respot-fetch --config <path> ...           Load a custom config TOML
//! respot-fetch --format mp3-320 ...          Label the file's encoding
//! respot-fetch --output track.ogg ...        Write the decrypted file
//! respot-fetch --gen-config                  Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use respot_core::{AudioFormat, FileId, TrackId};
use respot_fetch::config::FetchConfig;
use respot_fetch::fetch::fetch;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "respot-fetch", about = "Download one encrypted audio file from an access point")]
struct Cli {
    /// Track id, 32 hex digits.
    #[arg(required_unless_present = "gen_config")]
    track_id: Option<TrackId>,

    /// File id, 40 hex digits.
    #[arg(required_unless_present = "gen_config")]
    file_id: Option<FileId>,

    /// Audio format of the file.
    #[arg(short, long, default_value = "ogg-vorbis-160")]
    format: AudioFormat,

    /// Where to write the decrypted file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "respot-fetch.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&FetchConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = FetchConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::File::create(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    info!("respot-fetch v{}", env!("CARGO_PKG_VERSION"));
    info!("access point: {}:{}", config.network.host, config.network.port);

    let (Some(track_id), Some(file_id)) = (cli.track_id, cli.file_id) else {
        return Err("track id and file id are required".into());
    };

    let summary = fetch(&config, track_id, file_id, cli.format, cli.output.as_deref()).await?;
    info!("done");
    println!("{summary}");

    Ok(())
}
