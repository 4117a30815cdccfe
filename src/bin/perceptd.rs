//! perceptd: demo daemon running the full pipeline against synthetic inputs.
//!
//! Generates a frame stream, runs the synthetic hand and grid detectors
//! through a session, and prints every emitted event as one JSON line.

use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use clap::Parser;

use percept_kernel::config::PerceptdConfig;
use percept_kernel::detect::synthetic::{
    SyntheticHandDetector, SyntheticQuadDetector, SyntheticTextRecognizer,
};
use percept_kernel::detect::DetectorRegistry;
use percept_kernel::ingest::SyntheticSource;
use percept_kernel::{EventType, FrameSource, Point, Quad, SessionController, StaticGate};

#[derive(Parser, Debug)]
#[command(name = "perceptd", about = "synthetic perception pipeline demo")]
struct Args {
    /// Number of frames to run before stopping.
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Frame rate of the synthetic source.
    #[arg(long, env = "PERCEPT_SOURCE_FPS", default_value_t = 30)]
    fps: u32,

    /// Frame range (start..end) during which the paper grid is visible.
    #[arg(long, default_value_t = 30)]
    grid_from: u64,
    #[arg(long, default_value_t = 240)]
    grid_until: u64,

    /// Positional jitter amplitude applied to synthetic detections.
    #[arg(long, default_value_t = 0.004)]
    jitter: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = PerceptdConfig::load()?;

    let mut registry = DetectorRegistry::new();
    registry.register(SyntheticHandDetector::new(
        Point::new(0.3, 0.55),
        args.fps as u64, // one gesture per second
        args.jitter,
    ));
    registry.register(SyntheticQuadDetector::new(
        Quad::axis_aligned(Point::new(0.55, 0.2), 0.3, 0.3),
        args.grid_from..args.grid_until,
        args.jitter,
    ));

    let source = Arc::new(Mutex::new(SyntheticSource::new(
        config.source_width,
        config.source_height,
        args.fps,
    )));
    let mut controller = SessionController::new(
        Arc::new(StaticGate::allowed()),
        source.clone(),
        registry,
        Box::new(SyntheticTextRecognizer::new()),
        config.session.channel_capacity,
    );

    let subscription = controller.bus().subscribe("stdout", EventType::ALL);
    let printer = thread::spawn(move || {
        for event in subscription.iter() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => log::error!("failed to encode event: {err}"),
            }
        }
    });

    controller.start(config.session.clone())?;
    log::info!("session started: {} frames at {} fps", args.frames, args.fps);

    let interval = std::time::Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1)));
    for _ in 0..args.frames {
        let frame = {
            let mut source = source
                .lock()
                .map_err(|_| anyhow!("frame source mutex poisoned"))?;
            source.next_frame()?
        };
        controller.deliver_frame(frame);
        thread::sleep(interval);
    }

    controller.stop();
    printer
        .join()
        .map_err(|_| anyhow!("event printer panicked"))?;

    let stats = controller.stats();
    log::info!(
        "done: {} frames received, {} processed, {} skipped, {} events published",
        stats.frames_received(),
        stats.frames_processed(),
        stats.frames_skipped(),
        stats.events_published()
    );
    Ok(())
}
