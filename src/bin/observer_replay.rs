use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mahjong_observer::{
    JsonParser, OrchestratorBuilder, ReplayInterceptor, Settings, TileStyle,
};

#[derive(Parser)]
#[command(name = "observer-replay")]
#[command(about = "Replay a captured JSON-lines session through the observer")]
struct Args {
    /// Capture file, one frame per line
    #[arg(long)]
    capture: PathBuf,

    /// Settings file (defaults to ~/.mahjong-observer/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Render tiles as Unicode glyphs
    #[arg(long)]
    unicode: bool,

    #[arg(long)]
    verbose: bool,

    /// Keep the loop running this long after the capture is drained
    #[arg(long, default_value_t = 50)]
    linger_ms: u64,

    /// Give up waiting for the capture after this long
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let settings_path = args.settings.unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&settings_path)?;
    if args.unicode {
        settings.tile_style = TileStyle::Unicode;
    }
    // nothing to inject into or show during a replay
    settings.enable_injector = false;
    settings.auto_launch_frontend = false;

    let replay = ReplayInterceptor::from_path(&args.capture)?;
    let total = replay.len() as u64;
    eprintln!("Replaying {} frames from {:?}", total, args.capture);

    let symbols = settings.tile_style.symbols();
    let orchestrator = OrchestratorBuilder::new(settings, replay, JsonParser)
        .symbols(symbols)
        .build();
    orchestrator.start()?;

    let deadline = Instant::now() + Duration::from_millis(args.timeout_ms);
    while orchestrator.is_running() && orchestrator.status().frames < total {
        if Instant::now() >= deadline {
            eprintln!("Timed out after {} of {} frames", orchestrator.status().frames, total);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(args.linger_ms)).await;
    orchestrator.shutdown().await;

    let status = orchestrator.status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    if let Some(meta) = orchestrator.amulet_meta() {
        println!("meta: {}", serde_json::to_string(&meta)?);
    }
    if let Some(action) = orchestrator.amulet_pending_action() {
        println!("pending: {}", serde_json::to_string(&action)?);
    }
    let drawable = orchestrator.amulet_drawable_text();
    if !drawable.is_empty() {
        println!("\n{}", drawable);
    }
    let replace = orchestrator.amulet_replace_text();
    if !replace.is_empty() {
        println!("\n{}", replace);
    }

    if let Some(err) = orchestrator.fatal_error() {
        return Err(err.into());
    }
    Ok(())
}
