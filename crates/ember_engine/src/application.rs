//! Application trait implemented by programs hosted on the engine

use crate::config::ConfigError;
use crate::engine::Engine;
use thiserror::Error;

/// Errors an application may surface to the engine driver.
#[derive(Error, Debug)]
pub enum AppError {
    /// Application-defined failure.
    #[error("Application error: {0}")]
    Custom(String),
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Callbacks the engine driver invokes across the application lifecycle
///
/// `initialize` runs once after every subsystem is up, `update` and `render`
/// run once per frame while the engine is not suspended, and `shutdown` runs
/// once before subsystems are torn down. An error returned from `initialize`,
/// `update`, or `render` aborts the run.
pub trait Application {
    /// Called once after engine bring-up, before the first frame.
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError>;

    /// Called once per frame with the seconds elapsed since the previous one.
    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError>;

    /// Called once per frame after `update`, before the frame is drawn.
    fn render(&mut self, _engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
        Ok(())
    }

    /// Called when the framebuffer changes to a new non-zero size.
    fn on_resize(&mut self, _engine: &mut Engine, _width: u32, _height: u32) {}

    /// Called once when the main loop exits, while subsystems are still up.
    fn shutdown(&mut self, _engine: &mut Engine) {}
}
