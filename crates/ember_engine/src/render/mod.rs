//! Renderer frontend and backend plumbing
//!
//! The frontend owns exactly one backend chosen at startup and exposes the
//! narrow surface the engine driver uses: resize notification and whole
//! frames via [`Renderer::draw_frame`].

mod backend;
pub mod vulkan;
pub mod window;

pub use backend::{create_backend, BackendType, RenderBackend};

use thiserror::Error;

use crate::config::RendererConfig;
use window::Window;

/// Errors surfaced by the renderer frontend.
#[derive(Error, Debug)]
pub enum RendererError {
    /// The configured backend is not implemented.
    #[error("Unsupported backend: {0:?}")]
    UnsupportedBackend(BackendType),

    /// The backend reported a failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A frame was requested with no backend attached.
    #[error("No rendering backend available")]
    BackendUnavailable,
}

/// Everything the frontend needs to draw one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderPacket {
    /// Seconds elapsed since the previous frame.
    pub delta_time: f32,
}

/// Renderer frontend owning the active backend
///
/// `frame_number` counts frames that completed end-to-end: a skipped frame
/// (backend asked to sit out a rebuild) and a failed frame both leave it
/// unchanged.
pub struct Renderer {
    backend: Option<Box<dyn RenderBackend>>,
    frame_number: u64,
}

impl Renderer {
    /// Create the frontend with the backend named in `config`.
    pub fn new(
        app_name: &str,
        window: &mut Window,
        config: &RendererConfig,
    ) -> Result<Self, RendererError> {
        let backend = create_backend(config.backend, app_name, window, config)?;
        log::info!("Renderer initialized with {:?} backend", backend.backend_type());
        Ok(Self {
            backend: Some(backend),
            frame_number: 0,
        })
    }

    /// Forward a new framebuffer size to the backend.
    ///
    /// Safe to call with no backend attached; the notification is logged
    /// and dropped.
    pub fn on_resize(&mut self, width: u32, height: u32) {
        match self.backend.as_mut() {
            Some(backend) => backend.on_resize(width, height),
            None => log::warn!("Resize to {}x{} ignored, no backend attached", width, height),
        }
    }

    /// Draw one frame described by `packet`.
    ///
    /// A backend that declines to start the frame is not an error; the call
    /// returns `Ok` and the frame number stays put. A failure after the
    /// frame was begun is fatal and propagates.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> Result<(), RendererError> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(RendererError::BackendUnavailable);
        };

        match backend.begin_frame(packet.delta_time) {
            Ok(true) => {
                backend.end_frame(packet.delta_time)?;
                self.frame_number += 1;
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Block until the backend has retired all GPU work.
    pub fn wait_idle(&mut self) -> Result<(), RendererError> {
        match self.backend.as_mut() {
            Some(backend) => backend.wait_idle(),
            None => Ok(()),
        }
    }

    /// Number of frames completed end-to-end.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Which API the active backend targets, if one is attached.
    pub fn backend_type(&self) -> Option<BackendType> {
        self.backend.as_ref().map(|b| b.backend_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        begins: usize,
        ends: usize,
        resizes: Vec<(u32, u32)>,
    }

    struct ScriptedBackend {
        calls: Rc<RefCell<Calls>>,
        begin_results: VecDeque<Result<bool, RendererError>>,
        end_results: VecDeque<Result<(), RendererError>>,
    }

    impl ScriptedBackend {
        fn renderer(
            begin_results: Vec<Result<bool, RendererError>>,
            end_results: Vec<Result<(), RendererError>>,
        ) -> (Renderer, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            let backend = ScriptedBackend {
                calls: calls.clone(),
                begin_results: begin_results.into(),
                end_results: end_results.into(),
            };
            let renderer = Renderer {
                backend: Some(Box::new(backend)),
                frame_number: 0,
            };
            (renderer, calls)
        }
    }

    impl RenderBackend for ScriptedBackend {
        fn backend_type(&self) -> BackendType {
            BackendType::Vulkan
        }

        fn on_resize(&mut self, width: u32, height: u32) {
            self.calls.borrow_mut().resizes.push((width, height));
        }

        fn begin_frame(&mut self, _delta_time: f32) -> Result<bool, RendererError> {
            self.calls.borrow_mut().begins += 1;
            self.begin_results.pop_front().unwrap_or(Ok(true))
        }

        fn end_frame(&mut self, _delta_time: f32) -> Result<(), RendererError> {
            self.calls.borrow_mut().ends += 1;
            self.end_results.pop_front().unwrap_or(Ok(()))
        }

        fn wait_idle(&mut self) -> Result<(), RendererError> {
            Ok(())
        }
    }

    #[test]
    fn completed_frames_advance_the_frame_number() {
        let (mut renderer, calls) = ScriptedBackend::renderer(vec![], vec![]);
        let packet = RenderPacket { delta_time: 0.016 };

        renderer.draw_frame(&packet).unwrap();
        renderer.draw_frame(&packet).unwrap();

        assert_eq!(renderer.frame_number(), 2);
        assert_eq!(calls.borrow().begins, 2);
        assert_eq!(calls.borrow().ends, 2);
    }

    #[test]
    fn declined_frame_is_benign_and_skips_end() {
        let (mut renderer, calls) =
            ScriptedBackend::renderer(vec![Ok(false), Ok(true)], vec![]);
        let packet = RenderPacket { delta_time: 0.016 };

        renderer.draw_frame(&packet).unwrap();
        assert_eq!(renderer.frame_number(), 0);
        assert_eq!(calls.borrow().ends, 0);

        renderer.draw_frame(&packet).unwrap();
        assert_eq!(renderer.frame_number(), 1);
        assert_eq!(calls.borrow().ends, 1);
    }

    #[test]
    fn begin_failure_propagates_without_ending() {
        let (mut renderer, calls) = ScriptedBackend::renderer(
            vec![Err(RendererError::Backend("acquire failed".into()))],
            vec![],
        );

        let result = renderer.draw_frame(&RenderPacket::default());
        assert!(result.is_err());
        assert_eq!(renderer.frame_number(), 0);
        assert_eq!(calls.borrow().ends, 0);
    }

    #[test]
    fn end_failure_is_fatal_and_frame_number_stays() {
        let (mut renderer, _calls) = ScriptedBackend::renderer(
            vec![Ok(true)],
            vec![Err(RendererError::Backend("submit failed".into()))],
        );

        let result = renderer.draw_frame(&RenderPacket::default());
        assert!(result.is_err());
        assert_eq!(renderer.frame_number(), 0);
    }

    #[test]
    fn resize_is_forwarded_to_the_backend() {
        let (mut renderer, calls) = ScriptedBackend::renderer(vec![], vec![]);
        renderer.on_resize(1024, 768);
        assert_eq!(calls.borrow().resizes, vec![(1024, 768)]);
    }

    #[test]
    fn resize_without_backend_is_ignored() {
        let mut renderer = Renderer {
            backend: None,
            frame_number: 0,
        };
        renderer.on_resize(800, 600);
        assert!(renderer.wait_idle().is_ok());
    }

    #[test]
    fn draw_without_backend_errors() {
        let mut renderer = Renderer {
            backend: None,
            frame_number: 0,
        };
        let result = renderer.draw_frame(&RenderPacket::default());
        assert!(matches!(result, Err(RendererError::BackendUnavailable)));
    }
}
