mod host;

use std::{
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use frame_kit_core::{
    AppConfig, FrameClock, FrameMap, HostServices, LoadFailurePolicy, ManualFrameScheduler,
    MonotonicTimeSource, SpriteSheetPlayer, SpriteSource, UpdateMode,
};
use tracing_subscriber::EnvFilter;

use crate::host::{FileAssetLoader, TracingSurfaceHost};

fn main() -> frame_kit_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(&args),
        Commands::InspectMap { map } => run_inspect_map(&map),
    }
}

fn run_play(args: &PlayArgs) -> frame_kit_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if args.seed.is_some() {
        config.player.rng_seed = args.seed;
    }
    let mode = if args.manual {
        UpdateMode::Manual
    } else {
        UpdateMode::SelfDriven
    };
    tracing::info!(atlas = ?args.atlas, map = ?args.map, ?mode, "starting sprite playback");

    let scheduler = Rc::new(ManualFrameScheduler::new());
    let host = HostServices::new(
        Rc::new(MonotonicTimeSource::new()),
        scheduler.clone(),
        Rc::new(FileAssetLoader),
    );
    let surfaces = TracingSurfaceHost::new(args.container.as_str());

    let player = SpriteSheetPlayer::new(
        &args.container,
        SpriteSource::new(path_string(&args.atlas), path_string(&args.map)),
        mode,
        &host,
        &surfaces,
        config.player.clone(),
    )?;
    player.resize(args.width, args.height);
    player.on_load_failure(|failure| tracing::error!(%failure, "sprite sheet unavailable"));

    let clock = FrameClock::new(&host, &config.clock);
    if mode == UpdateMode::Manual {
        clock.register_callback(player.frame_callback());
    }
    clock.play();
    player.init();

    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    let frames = pump_frames(&scheduler, run_for, args.fps);

    clock.pause();
    player.stop();
    tracing::info!(
        frames,
        drawn = surfaces.draw_count(),
        last_frame = player.current_frame_index(),
        frame_count = player.frame_count(),
        "playback finished"
    );

    match player.load_failure() {
        Some(failure) if config.player.failure_policy == LoadFailurePolicy::Report => {
            Err(failure.into())
        }
        _ => Ok(()),
    }
}

/// Host loop: one scheduler frame per display interval until `run_for` elapses.
fn pump_frames(scheduler: &ManualFrameScheduler, run_for: Duration, fps: f64) -> usize {
    let interval = Duration::from_secs_f64(1.0 / fps.max(1.0));
    let started = Instant::now();
    let mut frames = 0;

    while started.elapsed() < run_for {
        let frame_start = Instant::now();
        scheduler.run_frame();
        frames += 1;
        if let Some(rest) = interval.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    frames
}

fn run_inspect_map(path: &Path) -> frame_kit_core::Result<()> {
    let text = std::fs::read_to_string(path)?;
    let map = FrameMap::from_json(&text)?;
    tracing::info!(?path, frames = map.len(), "frame map parsed");
    for (index, frame) in map.frames().iter().enumerate() {
        tracing::info!(
            index,
            x = frame.x,
            y = frame.y,
            width = frame.width,
            height = frame.height,
            "frame"
        );
    }
    Ok(())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sprite sheet and frame clock player", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a sprite sheet for a fixed amount of time.
    Play(PlayArgs),
    /// Parse a frame map and print its rectangles.
    InspectMap {
        /// Path to the JSON frame map.
        map: PathBuf,
    },
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Sprite sheet image.
    #[arg(long)]
    atlas: PathBuf,
    /// JSON frame map matching the sprite sheet.
    #[arg(long)]
    map: PathBuf,
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// How long to run, in seconds.
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,
    /// Host refresh rate used to pace frames.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,
    #[arg(long, default_value_t = 256)]
    width: u32,
    #[arg(long, default_value_t = 256)]
    height: u32,
    /// Container id the surface is mounted into.
    #[arg(long, default_value = "sprite")]
    container: String,
    /// Step the sprite from the frame clock instead of its own loop.
    #[arg(long)]
    manual: bool,
    /// Seed for the pause between loops.
    #[arg(long)]
    seed: Option<u64>,
}
