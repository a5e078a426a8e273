use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use radio_player_core::metadata::{active_track, dedupe, parse_playlist};
use radio_player_core::{
    Capabilities, CommandSurface, ManualTimers, MediaSink, MemorySink, NowPlaying, PcmTap, PlaybackController,
    PlayerConfig, SinkEvent, SoftwareDecodeBackend, SpectrumRenderer,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f32 = 44_100.0;

fn main() -> radio_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };

    match cli.command {
        Commands::Simulate { url, stalls, ios } => run_simulate(config, &url, stalls, ios),
        Commands::Render {
            frames,
            width,
            height,
            backdrop,
            output,
        } => run_render(config, frames, (width, height), backdrop, output.as_deref()),
        Commands::Tags { input, now_ms, offset_ms } => run_tags(&config, &input, now_ms, offset_ms),
    }
}

fn run_simulate(config: PlayerConfig, url: &str, stalls: u32, ios: bool) -> radio_player_core::Result<()> {
    tracing::info!(url, stalls, "simulating playback session");
    let capabilities = Capabilities {
        ios,
        ..Capabilities::headless()
    };
    let retry = Duration::from_millis(config.reconnect.live_retry_delay_ms.max(config.reconnect.buffered_retry_delay_ms));
    let mut controller = PlaybackController::new(config, capabilities, MemorySink::new(), ManualTimers::new())?;

    let mut steps = Vec::new();
    let mut record = |step: &str, controller: &PlaybackController<MemorySink, ManualTimers>| {
        let state = controller.state();
        steps.push(json!({
            "step": step,
            "status": format!("{:?}", state.status),
            "buffering": state.is_buffering(),
            "attempts": controller.policy().attempts(),
            "pendingTimers": controller.timers().pending().count(),
        }));
    };

    controller.load_streams(&[url]);
    record("load", &controller);
    controller.play();
    record("play", &controller);
    controller.handle_sink_event(SinkEvent::Playing);
    record("playing", &controller);

    for _ in 0..stalls {
        controller.handle_sink_event(SinkEvent::Stalled);
        record("stalled", &controller);
        for token in controller.timers_mut().advance(retry) {
            controller.handle_timer(token);
        }
        record("retry", &controller);
        controller.handle_sink_event(SinkEvent::Playing);
        record("playing", &controller);
    }

    controller.stop();
    record("stop", &controller);

    let report = json!({
        "steps": steps,
        "sinkCalls": controller.sink().calls(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_render(
    config: PlayerConfig,
    frames: u32,
    size: (f32, f32),
    backdrop: Option<String>,
    output: Option<&Path>,
) -> radio_player_core::Result<()> {
    tracing::info!(frames, ?size, "rendering synthetic spectrum");
    let tap = PcmTap::new(config.analyser.fft_size * 4);
    let backend = SoftwareDecodeBackend::new(tap.clone());
    let mut renderer = SpectrumRenderer::new(config.visualizer.clone());
    let mut controller = PlaybackController::new(
        config,
        Capabilities::headless(),
        MemorySink::new(),
        ManualTimers::new(),
    )?
    .with_decode_backend(Box::new(backend));

    let mut surface = CommandSurface::new(size.0, size.1);
    renderer.open(backdrop);
    let before = renderer.frame(controller.registry(), controller.sink().identity(), &mut surface);
    tracing::info!(?before, "frame before playback");

    controller.load_streams(&["https://radio.example/synthetic.mp3"]);
    controller.play();
    controller.handle_sink_event(SinkEvent::Playing);

    let block = (SAMPLE_RATE / 60.0) as usize;
    let mut outcome = before;
    for frame in 0..frames {
        tap.push(&synthetic_block(frame as usize * block, block));
        surface.take_commands();
        outcome = renderer.frame(controller.registry(), controller.sink().identity(), &mut surface);
        if !outcome.should_continue() {
            break;
        }
    }
    tracing::info!(?outcome, zoom = renderer.zoom(), "last frame");

    let json = serde_json::to_string_pretty(&json!({
        "outcome": outcome,
        "commands": surface.commands(),
    }))?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

/// A pulsing 55 Hz kick under a 440 Hz tone and a touch of 3 kHz.
fn synthetic_block(offset: usize, len: usize) -> Vec<f32> {
    (offset..offset + len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            let kick = (0.5 + 0.5 * (2.0 * PI * 2.0 * t).sin()) * (2.0 * PI * 55.0 * t).sin();
            0.5 * kick + 0.2 * (2.0 * PI * 440.0 * t).sin() + 0.05 * (2.0 * PI * 3_000.0 * t).sin()
        })
        .collect()
}

fn run_tags(
    config: &PlayerConfig,
    input: &Path,
    now_ms: Option<f64>,
    offset_ms: f64,
) -> radio_player_core::Result<()> {
    tracing::info!(?input, "parsing playlist tags");
    let playlist = std::fs::read_to_string(input)?;
    let tracks = dedupe(parse_playlist(&playlist));
    let now = now_ms.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as f64)
            .unwrap_or_default()
    });
    let active = active_track(&tracks, now, offset_ms)
        .map(|track| NowPlaying::from_metadata(track, &config.playback.station_name));

    let report = json!({
        "tracks": tracks,
        "active": active,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless live radio player", long_about = None)]
struct Cli {
    /// JSON player configuration; defaults apply to anything omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted session against a headless sink and print each step.
    Simulate {
        #[arg(long, default_value = "https://radio.example/live.mp3")]
        url: String,
        /// Number of stall/retry cycles to play through.
        #[arg(long, default_value_t = 2)]
        stalls: u32,
        /// Behave like an iOS device.
        #[arg(long)]
        ios: bool,
    },
    /// Drive the visualizer with a synthetic signal and dump the last frame.
    Render {
        #[arg(long, default_value_t = 60)]
        frames: u32,
        #[arg(long, default_value_t = 1280.0)]
        width: f32,
        #[arg(long, default_value_t = 720.0)]
        height: f32,
        /// Backdrop image URL.
        #[arg(long)]
        backdrop: Option<String>,
        /// Where to write the draw commands; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse per-segment metadata tags from a media playlist.
    Tags {
        input: PathBuf,
        /// Wall clock in Unix milliseconds; the current time when omitted.
        #[arg(long)]
        now_ms: Option<f64>,
        /// Server clock offset in milliseconds.
        #[arg(long, default_value_t = 0.0)]
        offset_ms: f64,
    },
}
