//! Backend abstraction the renderer frontend drives

use serde::{Deserialize, Serialize};

use crate::config::RendererConfig;
use crate::render::vulkan::VulkanBackend;
use crate::render::window::Window;
use crate::render::RendererError;

/// Rendering APIs a backend can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// Vulkan. The only backend currently implemented.
    Vulkan,
    /// OpenGL. Recognized in configuration but not implemented.
    OpenGl,
    /// DirectX. Recognized in configuration but not implemented.
    DirectX,
}

/// Operations the renderer frontend drives a backend through.
pub trait RenderBackend {
    /// Which API this backend targets.
    fn backend_type(&self) -> BackendType;

    /// Note a new framebuffer size. Render targets are rebuilt lazily at
    /// the next frame boundary.
    fn on_resize(&mut self, width: u32, height: u32);

    /// Start a frame. `Ok(false)` asks the caller to skip this frame
    /// without error, typically because render targets are being rebuilt.
    fn begin_frame(&mut self, delta_time: f32) -> Result<bool, RendererError>;

    /// Finish and present the frame opened by the matching `begin_frame`.
    fn end_frame(&mut self, delta_time: f32) -> Result<(), RendererError>;

    /// Block until the GPU has retired all submitted work.
    fn wait_idle(&mut self) -> Result<(), RendererError>;
}

/// Instantiate the backend named by `backend_type`.
pub fn create_backend(
    backend_type: BackendType,
    app_name: &str,
    window: &mut Window,
    config: &RendererConfig,
) -> Result<Box<dyn RenderBackend>, RendererError> {
    match backend_type {
        BackendType::Vulkan => {
            let backend = VulkanBackend::new(app_name, window, config)
                .map_err(|e| RendererError::Backend(e.to_string()))?;
            Ok(Box::new(backend))
        }
        other => Err(RendererError::UnsupportedBackend(other)),
    }
}
