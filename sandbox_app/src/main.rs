//! Sandbox application
//!
//! A minimal host that exercises the engine loop: per-frame scratch
//! allocation, input queries, and periodic timing/memory reports.

use ember_engine::foundation::logging;
use ember_engine::prelude::*;

/// Scratch arena size for per-frame allocations.
const FRAME_ARENA_SIZE: usize = 1024 * 1024;

/// How often to log a frame report, in seconds.
const REPORT_INTERVAL_SECS: f32 = 5.0;

struct SandboxApp {
    frame_arena: LinearAllocator,
    report_watch: Stopwatch,
    frames_since_report: u32,
}

impl SandboxApp {
    fn new() -> Self {
        Self {
            frame_arena: LinearAllocator::new(FRAME_ARENA_SIZE),
            report_watch: Stopwatch::new(),
            frames_since_report: 0,
        }
    }
}

impl Application for SandboxApp {
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
        engine
            .memory_mut()
            .track_alloc(MemoryTag::Game, self.frame_arena.total_size() as u64);
        self.report_watch.start();
        log::info!(
            "Sandbox initialized with a {} KiB frame arena",
            self.frame_arena.total_size() / 1024
        );
        Ok(())
    }

    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError> {
        // Transient working set for this frame, released wholesale.
        self.frame_arena.free_all();
        let scratch = (delta_time.max(0.001) * 16_384.0) as usize;
        if self.frame_arena.allocate(scratch.min(FRAME_ARENA_SIZE)).is_none() {
            return Err(AppError::Custom("frame arena exhausted".to_string()));
        }

        let input = engine.input();
        if input.is_key_down(KeyCode::Space) && input.was_key_up(KeyCode::Space) {
            log::info!("space pressed at {:?}", input.mouse_position());
        }

        self.frames_since_report += 1;
        if self.report_watch.elapsed_secs() >= REPORT_INTERVAL_SECS {
            let clock = engine.clock();
            log::info!(
                "{} frames in {:.1}s ({:.1} fps average)",
                self.frames_since_report,
                self.report_watch.elapsed_secs(),
                clock.average_fps()
            );
            log::info!("{}", engine.memory().usage_report());
            self.frames_since_report = 0;
            self.report_watch.restart();
        }

        Ok(())
    }

    fn on_resize(&mut self, _engine: &mut Engine, width: u32, height: u32) {
        log::info!("Sandbox resized to {}x{}", width, height);
    }

    fn shutdown(&mut self, engine: &mut Engine) {
        engine
            .memory_mut()
            .track_free(MemoryTag::Game, self.frame_arena.total_size() as u64);
        log::info!("Sandbox shut down");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    log::info!("Starting Ember sandbox");

    let config = match EngineConfig::load_from_file("sandbox.toml") {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Could not load sandbox.toml ({e}), using defaults");
            EngineConfig::default()
        }
    };

    let mut app = SandboxApp::new();
    match Engine::run(config, &mut app) {
        Ok(()) => {
            log::info!("Sandbox finished");
            Ok(())
        }
        Err(e) => {
            log::error!("Engine error: {e}");
            Err(e.into())
        }
    }
}
