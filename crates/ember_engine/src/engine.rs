//! Engine driver: subsystem lifecycle and the main frame loop

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::application::{AppError, Application};
use crate::config::EngineConfig;
use crate::events::{
    code, EventBus, EventCode, EventContext, EventListener, ListenerId, SharedListener,
};
use crate::foundation::memory::{MemoryTag, MemoryTracker};
use crate::foundation::time::{Clock, Stopwatch};
use crate::input::{InputState, KeyCode, MouseButton};
use crate::render::window::{Window, WindowError};
use crate::render::{RenderPacket, Renderer, RendererError};

/// Errors that can stop the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Subsystem bring-up failed.
    #[error("Engine initialization failed: {0}")]
    InitializationFailed(String),

    /// The window layer failed.
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// The renderer failed.
    #[error("Renderer error: {0}")]
    Renderer(#[from] RendererError),

    /// The hosted application reported a failure.
    #[error("Application error: {0}")]
    Application(#[from] AppError),
}

/// Requests a stop when the quit event fires.
struct QuitHook {
    quit_requested: bool,
}

impl EventListener for QuitHook {
    fn on_event(
        &mut self,
        _bus: &mut EventBus,
        code: EventCode,
        _sender: ListenerId,
        _context: &EventContext,
    ) -> bool {
        if code == code::APPLICATION_QUIT {
            self.quit_requested = true;
            return true;
        }
        false
    }
}

/// Turns an escape key press into a quit request.
struct KeyHook;

impl EventListener for KeyHook {
    fn on_event(
        &mut self,
        bus: &mut EventBus,
        code: EventCode,
        _sender: ListenerId,
        context: &EventContext,
    ) -> bool {
        if code == code::KEY_PRESSED && context.u16(0) == KeyCode::Escape as u16 {
            bus.fire(
                code::APPLICATION_QUIT,
                ListenerId::ENGINE,
                &EventContext::default(),
            );
            return true;
        }
        false
    }
}

/// Tracks window size, suspension across minimize, and pending resizes
/// the driver forwards between pumps. Always leaves the event unhandled so
/// other listeners still observe it.
struct ResizeHook {
    width: u32,
    height: u32,
    suspended: bool,
    pending: Option<(u32, u32)>,
}

impl EventListener for ResizeHook {
    fn on_event(
        &mut self,
        _bus: &mut EventBus,
        code: EventCode,
        _sender: ListenerId,
        context: &EventContext,
    ) -> bool {
        if code != code::RESIZED {
            return false;
        }
        let width = u32::from(context.u16(0));
        let height = u32::from(context.u16(1));
        if width == self.width && height == self.height {
            return false;
        }
        self.width = width;
        self.height = height;

        if width == 0 || height == 0 {
            log::info!("Window minimized, suspending");
            self.suspended = true;
            self.pending = None;
            return false;
        }

        if self.suspended {
            log::info!("Window restored, resuming");
            self.suspended = false;
        }
        self.pending = Some((width, height));
        false
    }
}

/// Routes raw key, button, cursor and wheel reports into the input tracker,
/// which fires the matching bus events on edges.
fn dispatch_input_event(input: &mut InputState, events: &mut EventBus, event: &glfw::WindowEvent) {
    match *event {
        glfw::WindowEvent::Key(key, _scancode, action, _mods) => {
            if let Some(key) = KeyCode::from_glfw(key) {
                let pressed = action != glfw::Action::Release;
                input.process_key(events, key, pressed);
            }
        }
        glfw::WindowEvent::MouseButton(button, action, _mods) => {
            if let Some(button) = MouseButton::from_glfw(button) {
                let pressed = action != glfw::Action::Release;
                input.process_button(events, button, pressed);
            }
        }
        glfw::WindowEvent::CursorPos(x, y) => {
            input.process_mouse_move(events, x as i32, y as i32);
        }
        glfw::WindowEvent::Scroll(_x, y) => {
            if y != 0.0 {
                let delta: i8 = if y > 0.0 { 1 } else { -1 };
                input.process_mouse_wheel(events, delta);
            }
        }
        _ => {}
    }
}

/// Owns every subsystem and drives the application frame loop
///
/// Field order doubles as teardown order: the renderer must release GPU
/// resources while the window (and its surface) still exists.
pub struct Engine {
    renderer: Renderer,
    window: Window,
    input: InputState,
    events: EventBus,
    quit_hook: Rc<RefCell<QuitHook>>,
    key_hook: Rc<RefCell<KeyHook>>,
    resize_hook: Rc<RefCell<ResizeHook>>,
    memory: MemoryTracker,
    clock: Clock,
    frame_watch: Stopwatch,
    config: EngineConfig,
    running: bool,
    suspended: bool,
    width: u32,
    height: u32,
}

impl Engine {
    /// Bring up every subsystem in dependency order: events, memory
    /// telemetry, input, engine hooks, window, renderer. Hooks register
    /// before the window exists so early platform events are not lost.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        log::info!("Ember Engine v{}", env!("CARGO_PKG_VERSION"));

        let mut events = EventBus::new();
        let mut memory = MemoryTracker::new();
        memory.track_alloc(MemoryTag::Event, std::mem::size_of::<EventBus>() as u64);

        let input = InputState::new();
        memory.track_alloc(MemoryTag::Input, std::mem::size_of::<InputState>() as u64);

        let quit_hook = Rc::new(RefCell::new(QuitHook {
            quit_requested: false,
        }));
        let key_hook = Rc::new(RefCell::new(KeyHook));
        let resize_hook = Rc::new(RefCell::new(ResizeHook {
            width: config.window.width,
            height: config.window.height,
            suspended: false,
            pending: None,
        }));

        let quit_shared: SharedListener = quit_hook.clone();
        let key_shared: SharedListener = key_hook.clone();
        let resize_shared: SharedListener = resize_hook.clone();
        events.register(code::APPLICATION_QUIT, ListenerId::ENGINE, quit_shared);
        events.register(code::KEY_PRESSED, ListenerId::ENGINE, key_shared);
        events.register(code::RESIZED, ListenerId::ENGINE, resize_shared);

        let mut window = Window::new(&config.window)?;
        memory.track_alloc(
            MemoryTag::Application,
            std::mem::size_of::<Window>() as u64,
        );

        let renderer = Renderer::new(&config.application_name, &mut window, &config.renderer)?;
        memory.track_alloc(MemoryTag::Renderer, std::mem::size_of::<Renderer>() as u64);

        let (width, height) = window.get_framebuffer_size();
        log::info!("Engine initialized at {}x{}", width, height);

        Ok(Self {
            renderer,
            window,
            input,
            events,
            quit_hook,
            key_hook,
            resize_hook,
            memory,
            clock: Clock::new(),
            frame_watch: Stopwatch::new(),
            config,
            running: true,
            suspended: false,
            width,
            height,
        })
    }

    /// Run `app` to completion on a freshly created engine.
    ///
    /// The application's `shutdown` runs even when the loop exits with an
    /// error, while subsystems are still alive.
    pub fn run<A: Application>(config: EngineConfig, app: &mut A) -> Result<(), EngineError> {
        let mut engine = Engine::new(config)?;
        app.initialize(&mut engine)?;
        log::info!("{}", engine.memory.usage_report());

        let result = engine.main_loop(app);

        app.shutdown(&mut engine);
        engine.shutdown();
        result
    }

    fn main_loop<A: Application>(&mut self, app: &mut A) -> Result<(), EngineError> {
        while self.running {
            self.pump_messages();
            self.apply_signals(app);

            if !self.running {
                break;
            }
            if self.suspended {
                continue;
            }

            self.clock.update();
            let delta_time = self.clock.delta_time();
            self.frame_watch.restart();

            app.update(self, delta_time)?;
            app.render(self, delta_time)?;

            let packet = RenderPacket { delta_time };
            self.renderer.draw_frame(&packet)?;

            if self.config.limit_frame_rate {
                let target =
                    Duration::from_secs_f64(1.0 / f64::from(self.config.target_frame_rate.max(1)));
                let elapsed = self.frame_watch.elapsed();
                if elapsed < target {
                    thread::sleep(target - elapsed);
                }
            }

            // Promote input state only after every consumer has seen this
            // frame's edges.
            self.input.update();
        }

        self.running = false;
        Ok(())
    }

    /// Drain platform events into the bus and input tracker.
    fn pump_messages(&mut self) {
        for event in self.window.drain_events() {
            self.handle_window_event(event);
        }
        if self.window.should_close() {
            self.events.fire(
                code::APPLICATION_QUIT,
                ListenerId::ENGINE,
                &EventContext::default(),
            );
        }
    }

    fn handle_window_event(&mut self, event: glfw::WindowEvent) {
        match event {
            glfw::WindowEvent::Close => {
                self.events.fire(
                    code::APPLICATION_QUIT,
                    ListenerId::ENGINE,
                    &EventContext::default(),
                );
            }
            glfw::WindowEvent::FramebufferSize(width, height) => {
                self.fire_resize(width.max(0) as u32, height.max(0) as u32);
            }
            glfw::WindowEvent::Iconify(true) => self.fire_resize(0, 0),
            glfw::WindowEvent::Iconify(false) => {
                let (width, height) = self.window.get_framebuffer_size();
                self.fire_resize(width, height);
            }
            other => dispatch_input_event(&mut self.input, &mut self.events, &other),
        }
    }

    fn fire_resize(&mut self, width: u32, height: u32) {
        let mut context = EventContext::default();
        context.set_u16(0, width as u16);
        context.set_u16(1, height as u16);
        self.events.fire(code::RESIZED, ListenerId::ENGINE, &context);
    }

    /// Fold hook state gathered during dispatch back into the driver:
    /// quit requests, suspension, and resizes to forward.
    fn apply_signals<A: Application>(&mut self, app: &mut A) {
        let quit_requested = self.quit_hook.borrow().quit_requested;
        if quit_requested {
            self.running = false;
        }

        let (suspended, pending) = {
            let mut hook = self.resize_hook.borrow_mut();
            (hook.suspended, hook.pending.take())
        };
        self.suspended = suspended;

        if let Some((width, height)) = pending {
            self.width = width;
            self.height = height;
            app.on_resize(self, width, height);
            self.renderer.on_resize(width, height);
        }
    }

    fn shutdown(&mut self) {
        let quit_shared: SharedListener = self.quit_hook.clone();
        let key_shared: SharedListener = self.key_hook.clone();
        let resize_shared: SharedListener = self.resize_hook.clone();
        self.events
            .unregister(code::APPLICATION_QUIT, ListenerId::ENGINE, &quit_shared);
        self.events
            .unregister(code::KEY_PRESSED, ListenerId::ENGINE, &key_shared);
        self.events
            .unregister(code::RESIZED, ListenerId::ENGINE, &resize_shared);

        if let Err(e) = self.renderer.wait_idle() {
            log::error!("Renderer wait failed during shutdown: {e}");
        }
        log::info!("Engine shut down");
    }

    /// Request the loop to stop at the end of the current frame.
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The event bus, mutably, for registration and firing.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// The input tracker.
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// The frame clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Memory telemetry.
    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    /// Memory telemetry, mutably, so applications can report their own
    /// allocations.
    pub fn memory_mut(&mut self) -> &mut MemoryTracker {
        &mut self.memory
    }

    /// The renderer frontend.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// The configuration the engine was started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current framebuffer width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current framebuffer height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the driver is currently suspended (minimized window).
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook_bus() -> (EventBus, Rc<RefCell<QuitHook>>, Rc<RefCell<ResizeHook>>) {
        let mut bus = EventBus::new();
        let quit_hook = Rc::new(RefCell::new(QuitHook {
            quit_requested: false,
        }));
        let key_hook = Rc::new(RefCell::new(KeyHook));
        let resize_hook = Rc::new(RefCell::new(ResizeHook {
            width: 1280,
            height: 720,
            suspended: false,
            pending: None,
        }));

        let quit_shared: SharedListener = quit_hook.clone();
        let key_shared: SharedListener = key_hook.clone();
        let resize_shared: SharedListener = resize_hook.clone();
        bus.register(code::APPLICATION_QUIT, ListenerId::ENGINE, quit_shared);
        bus.register(code::KEY_PRESSED, ListenerId::ENGINE, key_shared);
        bus.register(code::RESIZED, ListenerId::ENGINE, resize_shared);

        (bus, quit_hook, resize_hook)
    }

    fn resize_context(width: u16, height: u16) -> EventContext {
        let mut context = EventContext::default();
        context.set_u16(0, width);
        context.set_u16(1, height);
        context
    }

    #[test]
    fn quit_event_sets_the_quit_flag() {
        let (mut bus, quit_hook, _resize_hook) = hook_bus();

        let handled = bus.fire(
            code::APPLICATION_QUIT,
            ListenerId::APPLICATION,
            &EventContext::default(),
        );
        assert!(handled);
        assert!(quit_hook.borrow().quit_requested);
    }

    #[test]
    fn escape_press_chains_into_a_quit_request() {
        let (mut bus, quit_hook, _resize_hook) = hook_bus();

        let mut context = EventContext::default();
        context.set_u16(0, KeyCode::Escape as u16);
        let handled = bus.fire(code::KEY_PRESSED, ListenerId::INPUT, &context);

        assert!(handled);
        assert!(quit_hook.borrow().quit_requested);
    }

    #[test]
    fn other_keys_do_not_request_quit() {
        let (mut bus, quit_hook, _resize_hook) = hook_bus();

        let mut context = EventContext::default();
        context.set_u16(0, KeyCode::W as u16);
        let handled = bus.fire(code::KEY_PRESSED, ListenerId::INPUT, &context);

        assert!(!handled);
        assert!(!quit_hook.borrow().quit_requested);
    }

    #[test]
    fn escape_press_through_the_input_tracker_requests_quit() {
        let (mut bus, quit_hook, _resize_hook) = hook_bus();
        let mut input = InputState::new();

        input.process_key(&mut bus, KeyCode::Escape, true);
        assert!(quit_hook.borrow().quit_requested);
    }

    #[test]
    fn resize_records_a_pending_forward() {
        let (mut bus, _quit_hook, resize_hook) = hook_bus();

        let handled = bus.fire(code::RESIZED, ListenerId::ENGINE, &resize_context(800, 600));
        assert!(!handled);

        let hook = resize_hook.borrow();
        assert_eq!(hook.pending, Some((800, 600)));
        assert!(!hook.suspended);
    }

    #[test]
    fn zero_dimension_suspends_and_drops_the_pending_resize() {
        let (mut bus, _quit_hook, resize_hook) = hook_bus();

        bus.fire(code::RESIZED, ListenerId::ENGINE, &resize_context(800, 600));
        bus.fire(code::RESIZED, ListenerId::ENGINE, &resize_context(0, 0));

        {
            let hook = resize_hook.borrow();
            assert!(hook.suspended);
            assert_eq!(hook.pending, None);
        }

        bus.fire(code::RESIZED, ListenerId::ENGINE, &resize_context(1024, 768));
        let hook = resize_hook.borrow();
        assert!(!hook.suspended);
        assert_eq!(hook.pending, Some((1024, 768)));
    }

    #[test]
    fn unchanged_size_is_dropped() {
        let (mut bus, _quit_hook, resize_hook) = hook_bus();

        bus.fire(code::RESIZED, ListenerId::ENGINE, &resize_context(800, 600));
        resize_hook.borrow_mut().pending = None;

        bus.fire(code::RESIZED, ListenerId::ENGINE, &resize_context(800, 600));
        assert_eq!(resize_hook.borrow().pending, None);
    }

    #[test]
    fn key_window_events_reach_the_input_tracker() {
        let mut bus = EventBus::new();
        let mut input = InputState::new();

        let press = glfw::WindowEvent::Key(
            glfw::Key::W,
            0,
            glfw::Action::Press,
            glfw::Modifiers::empty(),
        );
        dispatch_input_event(&mut input, &mut bus, &press);
        assert!(input.is_key_down(KeyCode::W));

        let repeat = glfw::WindowEvent::Key(
            glfw::Key::W,
            0,
            glfw::Action::Repeat,
            glfw::Modifiers::empty(),
        );
        dispatch_input_event(&mut input, &mut bus, &repeat);
        assert!(input.is_key_down(KeyCode::W));

        let release = glfw::WindowEvent::Key(
            glfw::Key::W,
            0,
            glfw::Action::Release,
            glfw::Modifiers::empty(),
        );
        dispatch_input_event(&mut input, &mut bus, &release);
        assert!(input.is_key_up(KeyCode::W));
    }

    #[test]
    fn scroll_events_are_normalized() {
        let mut bus = EventBus::new();
        let mut input = InputState::new();

        struct WheelRecorder {
            deltas: Vec<i8>,
        }
        impl EventListener for WheelRecorder {
            fn on_event(
                &mut self,
                _bus: &mut EventBus,
                _code: EventCode,
                _sender: ListenerId,
                context: &EventContext,
            ) -> bool {
                self.deltas.push(context.i8(0));
                false
            }
        }

        let recorder = Rc::new(RefCell::new(WheelRecorder { deltas: Vec::new() }));
        let shared: SharedListener = recorder.clone();
        bus.register(code::MOUSE_WHEEL, ListenerId::APPLICATION, shared);

        dispatch_input_event(&mut input, &mut bus, &glfw::WindowEvent::Scroll(0.0, 2.5));
        dispatch_input_event(&mut input, &mut bus, &glfw::WindowEvent::Scroll(0.0, -0.5));
        dispatch_input_event(&mut input, &mut bus, &glfw::WindowEvent::Scroll(0.0, 0.0));

        assert_eq!(recorder.borrow().deltas, vec![1, -1]);
    }
}
