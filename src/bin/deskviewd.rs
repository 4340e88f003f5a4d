//! deskviewd - headless document-camera pipeline driver
//!
//! This daemon:
//! 1. Loads persisted viewer settings (defaults on corrupt input)
//! 2. Opens the configured capture device in the background
//! 3. Runs the per-tick pipeline at ~30 fps
//! 4. Logs capture health periodically
//! 5. Optionally exports the final composited frame on shutdown

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deskview::{
    export_frame, CaptureDevice, ExportFormat, InputEvent, Pipeline, Settings, Viewport,
    TICK_INTERVAL,
};

#[derive(Parser, Debug)]
#[command(name = "deskviewd", about = "Headless document-camera pipeline driver")]
struct Args {
    /// Settings file (flat JSON record).
    #[arg(long, env = "DESKVIEW_SETTINGS")]
    settings: Option<PathBuf>,

    /// Capture device: an index, or 'stub' for the synthetic source.
    #[arg(long, env = "DESKVIEW_DEVICE")]
    device: Option<CaptureDevice>,

    /// Display viewport as WIDTHxHEIGHT.
    #[arg(long, default_value = "1280x720")]
    viewport: String,

    /// Stop after this many ticks (0 = run until interrupted).
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Export the final composited frame here on shutdown.
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let viewport = parse_viewport(&args.viewport)?;

    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    if let Some(device) = args.device.clone() {
        settings.device = device;
    }

    log::info!(
        "deskviewd {} starting on device {}",
        env!("CARGO_PKG_VERSION"),
        settings.device
    );

    let mut pipeline = Pipeline::new(settings, viewport);
    pipeline.connect();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let mut last_health_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        let tick_started = Instant::now();
        let out = pipeline.tick();

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = pipeline.stats();
            log::info!(
                "health status={:?} frame={}x{} acquired={} read_failures={} skipped={}",
                pipeline.status(),
                out.frame.width(),
                out.frame.height(),
                stats.frames_acquired,
                stats.read_failures,
                stats.skipped_ticks
            );
            last_health_log = Instant::now();
        }

        if args.ticks > 0 && pipeline.stats().ticks >= args.ticks {
            break;
        }

        if let Some(remaining) = TICK_INTERVAL.checked_sub(tick_started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    if let Some(path) = &args.export {
        pipeline.push_event(InputEvent::ReturnToLive);
        pipeline.tick();
        match pipeline.exportable_frame() {
            Some(frame) => match export_frame(&frame, path, ExportFormat::from_path(path)) {
                Ok(()) => log::info!("exported final frame to {}", path.display()),
                Err(err) => log::warn!("{}", err),
            },
            None => log::warn!("no frame available to export"),
        }
    }

    let stats = pipeline.stats();
    log::info!(
        "deskviewd stopping: {} ticks, {} frames acquired, {} read failures",
        stats.ticks,
        stats.frames_acquired,
        stats.read_failures
    );
    Ok(())
}

fn parse_viewport(value: &str) -> Result<Viewport> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("viewport must be WIDTHxHEIGHT, got '{}'", value))?;
    Ok(Viewport::new(w.trim().parse()?, h.trim().parse()?))
}
