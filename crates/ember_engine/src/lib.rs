//! # Ember Engine
//!
//! A small real-time application engine with a Vulkan renderer.
//!
//! ## Features
//!
//! - **Vulkan Rendering**: swapchain-backed frame loop with per-frame
//!   CPU/GPU synchronization and clean resize recovery
//! - **Event Bus**: code-based publish/subscribe with handled
//!   short-circuiting
//! - **Input Tracking**: double-buffered keyboard and mouse state with
//!   edge-triggered press/release events
//! - **Frame Clock**: delta timing, FPS averages, optional frame pacing
//! - **Layered Configuration**: TOML or RON files over built-in defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_engine::prelude::*;
//!
//! struct MyApp;
//!
//! impl Application for MyApp {
//!     fn initialize(&mut self, _engine: &mut Engine) -> Result<(), AppError> {
//!         Ok(())
//!     }
//!
//!     fn update(&mut self, engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
//!         if engine.input().is_key_down(KeyCode::Space) {
//!             log::info!("jump");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut app = MyApp;
//!     Engine::run(config, &mut app)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod events;
pub mod foundation;
pub mod input;
pub mod render;

mod application;
mod engine;

pub use application::{AppError, Application};
pub use config::{Config, EngineConfig, RendererConfig, WindowConfig};
pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, EngineConfig, RendererConfig, WindowConfig},
        events::{code, EventBus, EventCode, EventContext, EventListener, ListenerId},
        foundation::{
            memory::{LinearAllocator, MemoryTag, MemoryTracker},
            time::{Clock, Stopwatch},
        },
        input::{InputState, KeyCode, MouseButton},
        render::{BackendType, RenderPacket, Renderer},
        AppError, Application, Engine, EngineError,
    };
}
