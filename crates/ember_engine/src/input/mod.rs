//! Keyboard and mouse state tracking
//!
//! State is double buffered: the engine feeds raw transitions in through the
//! `process_*` methods as the window reports them, queries compare against
//! the frame that just ended, and [`InputState::update`] promotes current
//! state to previous at the end of each frame. Transitions fire events on
//! the bus; unchanged reports are dropped so listeners only observe edges.

use crate::events::{code, EventBus, EventContext, ListenerId};

/// A physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyCode {
    /// The A key.
    A,
    /// The B key.
    B,
    /// The C key.
    C,
    /// The D key.
    D,
    /// The E key.
    E,
    /// The F key.
    F,
    /// The G key.
    G,
    /// The H key.
    H,
    /// The I key.
    I,
    /// The J key.
    J,
    /// The K key.
    K,
    /// The L key.
    L,
    /// The M key.
    M,
    /// The N key.
    N,
    /// The O key.
    O,
    /// The P key.
    P,
    /// The Q key.
    Q,
    /// The R key.
    R,
    /// The S key.
    S,
    /// The T key.
    T,
    /// The U key.
    U,
    /// The V key.
    V,
    /// The W key.
    W,
    /// The X key.
    X,
    /// The Y key.
    Y,
    /// The Z key.
    Z,
    /// The 0 key on the main row.
    Num0,
    /// The 1 key on the main row.
    Num1,
    /// The 2 key on the main row.
    Num2,
    /// The 3 key on the main row.
    Num3,
    /// The 4 key on the main row.
    Num4,
    /// The 5 key on the main row.
    Num5,
    /// The 6 key on the main row.
    Num6,
    /// The 7 key on the main row.
    Num7,
    /// The 8 key on the main row.
    Num8,
    /// The 9 key on the main row.
    Num9,
    /// The F1 key.
    F1,
    /// The F2 key.
    F2,
    /// The F3 key.
    F3,
    /// The F4 key.
    F4,
    /// The F5 key.
    F5,
    /// The F6 key.
    F6,
    /// The F7 key.
    F7,
    /// The F8 key.
    F8,
    /// The F9 key.
    F9,
    /// The F10 key.
    F10,
    /// The F11 key.
    F11,
    /// The F12 key.
    F12,
    /// The escape key.
    Escape,
    /// The enter key.
    Enter,
    /// The tab key.
    Tab,
    /// The backspace key.
    Backspace,
    /// The space bar.
    Space,
    /// The insert key.
    Insert,
    /// The delete key.
    Delete,
    /// The home key.
    Home,
    /// The end key.
    End,
    /// The page up key.
    PageUp,
    /// The page down key.
    PageDown,
    /// The caps lock key.
    CapsLock,
    /// The up arrow.
    Up,
    /// The down arrow.
    Down,
    /// The left arrow.
    Left,
    /// The right arrow.
    Right,
    /// The left shift key.
    LeftShift,
    /// The right shift key.
    RightShift,
    /// The left control key.
    LeftControl,
    /// The right control key.
    RightControl,
    /// The left alt key.
    LeftAlt,
    /// The right alt key.
    RightAlt,
    /// The apostrophe key.
    Apostrophe,
    /// The comma key.
    Comma,
    /// The minus key.
    Minus,
    /// The period key.
    Period,
    /// The slash key.
    Slash,
    /// The semicolon key.
    Semicolon,
    /// The equals key.
    Equal,
    /// The left bracket key.
    LeftBracket,
    /// The right bracket key.
    RightBracket,
    /// The backslash key.
    Backslash,
    /// The grave accent key.
    GraveAccent,
}

impl KeyCode {
    /// Translate a windowing key, if it is one this tracker follows.
    pub fn from_glfw(key: glfw::Key) -> Option<Self> {
        use glfw::Key;
        let code = match key {
            Key::A => KeyCode::A,
            Key::B => KeyCode::B,
            Key::C => KeyCode::C,
            Key::D => KeyCode::D,
            Key::E => KeyCode::E,
            Key::F => KeyCode::F,
            Key::G => KeyCode::G,
            Key::H => KeyCode::H,
            Key::I => KeyCode::I,
            Key::J => KeyCode::J,
            Key::K => KeyCode::K,
            Key::L => KeyCode::L,
            Key::M => KeyCode::M,
            Key::N => KeyCode::N,
            Key::O => KeyCode::O,
            Key::P => KeyCode::P,
            Key::Q => KeyCode::Q,
            Key::R => KeyCode::R,
            Key::S => KeyCode::S,
            Key::T => KeyCode::T,
            Key::U => KeyCode::U,
            Key::V => KeyCode::V,
            Key::W => KeyCode::W,
            Key::X => KeyCode::X,
            Key::Y => KeyCode::Y,
            Key::Z => KeyCode::Z,
            Key::Num0 => KeyCode::Num0,
            Key::Num1 => KeyCode::Num1,
            Key::Num2 => KeyCode::Num2,
            Key::Num3 => KeyCode::Num3,
            Key::Num4 => KeyCode::Num4,
            Key::Num5 => KeyCode::Num5,
            Key::Num6 => KeyCode::Num6,
            Key::Num7 => KeyCode::Num7,
            Key::Num8 => KeyCode::Num8,
            Key::Num9 => KeyCode::Num9,
            Key::F1 => KeyCode::F1,
            Key::F2 => KeyCode::F2,
            Key::F3 => KeyCode::F3,
            Key::F4 => KeyCode::F4,
            Key::F5 => KeyCode::F5,
            Key::F6 => KeyCode::F6,
            Key::F7 => KeyCode::F7,
            Key::F8 => KeyCode::F8,
            Key::F9 => KeyCode::F9,
            Key::F10 => KeyCode::F10,
            Key::F11 => KeyCode::F11,
            Key::F12 => KeyCode::F12,
            Key::Escape => KeyCode::Escape,
            Key::Enter => KeyCode::Enter,
            Key::Tab => KeyCode::Tab,
            Key::Backspace => KeyCode::Backspace,
            Key::Space => KeyCode::Space,
            Key::Insert => KeyCode::Insert,
            Key::Delete => KeyCode::Delete,
            Key::Home => KeyCode::Home,
            Key::End => KeyCode::End,
            Key::PageUp => KeyCode::PageUp,
            Key::PageDown => KeyCode::PageDown,
            Key::CapsLock => KeyCode::CapsLock,
            Key::Up => KeyCode::Up,
            Key::Down => KeyCode::Down,
            Key::Left => KeyCode::Left,
            Key::Right => KeyCode::Right,
            Key::LeftShift => KeyCode::LeftShift,
            Key::RightShift => KeyCode::RightShift,
            Key::LeftControl => KeyCode::LeftControl,
            Key::RightControl => KeyCode::RightControl,
            Key::LeftAlt => KeyCode::LeftAlt,
            Key::RightAlt => KeyCode::RightAlt,
            Key::Apostrophe => KeyCode::Apostrophe,
            Key::Comma => KeyCode::Comma,
            Key::Minus => KeyCode::Minus,
            Key::Period => KeyCode::Period,
            Key::Slash => KeyCode::Slash,
            Key::Semicolon => KeyCode::Semicolon,
            Key::Equal => KeyCode::Equal,
            Key::LeftBracket => KeyCode::LeftBracket,
            Key::RightBracket => KeyCode::RightBracket,
            Key::Backslash => KeyCode::Backslash,
            Key::GraveAccent => KeyCode::GraveAccent,
            _ => return None,
        };
        Some(code)
    }
}

/// A mouse button this tracker follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// The left button.
    Left,
    /// The right button.
    Right,
    /// The middle button.
    Middle,
}

impl MouseButton {
    /// Translate a windowing button, if it is one this tracker follows.
    pub fn from_glfw(button: glfw::MouseButton) -> Option<Self> {
        match button {
            glfw::MouseButton::Button1 => Some(MouseButton::Left),
            glfw::MouseButton::Button2 => Some(MouseButton::Right),
            glfw::MouseButton::Button3 => Some(MouseButton::Middle),
            _ => None,
        }
    }

    fn flag(self) -> ButtonFlags {
        match self {
            MouseButton::Left => ButtonFlags::LEFT,
            MouseButton::Right => ButtonFlags::RIGHT,
            MouseButton::Middle => ButtonFlags::MIDDLE,
        }
    }
}

bitflags::bitflags! {
    /// Currently held mouse buttons packed as a bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonFlags: u8 {
        /// Left button held.
        const LEFT = 1 << 0;
        /// Right button held.
        const RIGHT = 1 << 1;
        /// Middle button held.
        const MIDDLE = 1 << 2;
    }
}

struct KeyboardState {
    keys: [bool; 256],
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self { keys: [false; 256] }
    }
}

#[derive(Default, Clone, Copy)]
struct MouseState {
    x: i32,
    y: i32,
    buttons: ButtonFlags,
}

/// Double-buffered keyboard and mouse snapshots.
#[derive(Default)]
pub struct InputState {
    keyboard_current: KeyboardState,
    keyboard_previous: KeyboardState,
    mouse_current: MouseState,
    mouse_previous: MouseState,
}

impl InputState {
    /// Create a tracker with every key and button released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Promote current state to previous. Call once per frame, after all
    /// input processing and queries for the frame are done.
    pub fn update(&mut self) {
        self.keyboard_previous.keys = self.keyboard_current.keys;
        self.mouse_previous = self.mouse_current;
    }

    /// Record a key transition and fire the matching event if it is an edge.
    pub fn process_key(&mut self, bus: &mut EventBus, key: KeyCode, pressed: bool) {
        let slot = &mut self.keyboard_current.keys[key as usize];
        if *slot == pressed {
            return;
        }
        *slot = pressed;

        let mut context = EventContext::default();
        context.set_u16(0, key as u16);
        let event = if pressed {
            code::KEY_PRESSED
        } else {
            code::KEY_RELEASED
        };
        bus.fire(event, ListenerId::INPUT, &context);
    }

    /// Record a button transition and fire the matching event if it is an edge.
    pub fn process_button(&mut self, bus: &mut EventBus, button: MouseButton, pressed: bool) {
        let flag = button.flag();
        if self.mouse_current.buttons.contains(flag) == pressed {
            return;
        }
        self.mouse_current.buttons.set(flag, pressed);

        let mut context = EventContext::default();
        context.set_u16(0, button as u16);
        let event = if pressed {
            code::BUTTON_PRESSED
        } else {
            code::BUTTON_RELEASED
        };
        bus.fire(event, ListenerId::INPUT, &context);
    }

    /// Record a cursor position and fire a move event if it changed.
    pub fn process_mouse_move(&mut self, bus: &mut EventBus, x: i32, y: i32) {
        if self.mouse_current.x == x && self.mouse_current.y == y {
            return;
        }
        self.mouse_current.x = x;
        self.mouse_current.y = y;

        let mut context = EventContext::default();
        context.set_i16(0, x as i16);
        context.set_i16(1, y as i16);
        bus.fire(code::MOUSE_MOVED, ListenerId::INPUT, &context);
    }

    /// Fire a wheel event. Wheel input is pure motion, so every report fires.
    pub fn process_mouse_wheel(&mut self, bus: &mut EventBus, delta: i8) {
        let mut context = EventContext::default();
        context.set_i8(0, delta);
        bus.fire(code::MOUSE_WHEEL, ListenerId::INPUT, &context);
    }

    /// Whether `key` is down in the current frame.
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keyboard_current.keys[key as usize]
    }

    /// Whether `key` is up in the current frame.
    pub fn is_key_up(&self, key: KeyCode) -> bool {
        !self.keyboard_current.keys[key as usize]
    }

    /// Whether `key` was down in the previous frame.
    pub fn was_key_down(&self, key: KeyCode) -> bool {
        self.keyboard_previous.keys[key as usize]
    }

    /// Whether `key` was up in the previous frame.
    pub fn was_key_up(&self, key: KeyCode) -> bool {
        !self.keyboard_previous.keys[key as usize]
    }

    /// Whether `button` is held in the current frame.
    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.mouse_current.buttons.contains(button.flag())
    }

    /// Whether `button` is released in the current frame.
    pub fn is_button_up(&self, button: MouseButton) -> bool {
        !self.is_button_down(button)
    }

    /// Whether `button` was held in the previous frame.
    pub fn was_button_down(&self, button: MouseButton) -> bool {
        self.mouse_previous.buttons.contains(button.flag())
    }

    /// Whether `button` was released in the previous frame.
    pub fn was_button_up(&self, button: MouseButton) -> bool {
        !self.was_button_down(button)
    }

    /// Cursor position as of the current frame.
    pub fn mouse_position(&self) -> (i32, i32) {
        (self.mouse_current.x, self.mouse_current.y)
    }

    /// Cursor position as of the previous frame.
    pub fn previous_mouse_position(&self) -> (i32, i32) {
        (self.mouse_previous.x, self.mouse_previous.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCode, EventListener, SharedListener};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        fired: Vec<(EventCode, EventContext)>,
    }

    impl EventListener for Recorder {
        fn on_event(
            &mut self,
            _bus: &mut EventBus,
            code: EventCode,
            _sender: ListenerId,
            context: &EventContext,
        ) -> bool {
            self.fired.push((code, *context));
            false
        }
    }

    fn recording_bus() -> (EventBus, Rc<RefCell<Recorder>>) {
        let mut bus = EventBus::new();
        let recorder = Rc::new(RefCell::new(Recorder { fired: Vec::new() }));
        let shared: SharedListener = recorder.clone();
        for event in [
            code::KEY_PRESSED,
            code::KEY_RELEASED,
            code::BUTTON_PRESSED,
            code::BUTTON_RELEASED,
            code::MOUSE_MOVED,
            code::MOUSE_WHEEL,
        ] {
            bus.register(event, ListenerId::APPLICATION, shared.clone());
        }
        (bus, recorder)
    }

    #[test]
    fn fresh_tracker_reports_everything_released() {
        let input = InputState::new();
        assert!(input.is_key_up(KeyCode::A));
        assert!(input.was_key_up(KeyCode::A));
        assert!(input.is_button_up(MouseButton::Left));
        assert_eq!(input.mouse_position(), (0, 0));
    }

    #[test]
    fn key_edge_fires_once() {
        let (mut bus, recorder) = recording_bus();
        let mut input = InputState::new();

        input.process_key(&mut bus, KeyCode::W, true);
        input.process_key(&mut bus, KeyCode::W, true);
        assert!(input.is_key_down(KeyCode::W));

        let fired = &recorder.borrow().fired;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, code::KEY_PRESSED);
        assert_eq!(fired[0].1.u16(0), KeyCode::W as u16);
    }

    #[test]
    fn release_fires_its_own_event() {
        let (mut bus, recorder) = recording_bus();
        let mut input = InputState::new();

        input.process_key(&mut bus, KeyCode::Space, true);
        input.process_key(&mut bus, KeyCode::Space, false);

        let fired = &recorder.borrow().fired;
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[1].0, code::KEY_RELEASED);
    }

    #[test]
    fn update_promotes_current_to_previous() {
        let (mut bus, _recorder) = recording_bus();
        let mut input = InputState::new();

        input.process_key(&mut bus, KeyCode::D, true);
        assert!(input.is_key_down(KeyCode::D));
        assert!(input.was_key_up(KeyCode::D));

        input.update();
        assert!(input.was_key_down(KeyCode::D));

        input.process_key(&mut bus, KeyCode::D, false);
        assert!(input.is_key_up(KeyCode::D));
        assert!(input.was_key_down(KeyCode::D));
    }

    #[test]
    fn button_state_tracks_flags_independently() {
        let (mut bus, recorder) = recording_bus();
        let mut input = InputState::new();

        input.process_button(&mut bus, MouseButton::Left, true);
        input.process_button(&mut bus, MouseButton::Middle, true);
        input.process_button(&mut bus, MouseButton::Left, true);

        assert!(input.is_button_down(MouseButton::Left));
        assert!(input.is_button_down(MouseButton::Middle));
        assert!(input.is_button_up(MouseButton::Right));
        assert_eq!(recorder.borrow().fired.len(), 2);

        input.process_button(&mut bus, MouseButton::Left, false);
        assert!(input.is_button_up(MouseButton::Left));
        assert!(input.is_button_down(MouseButton::Middle));
    }

    #[test]
    fn mouse_move_drops_duplicates() {
        let (mut bus, recorder) = recording_bus();
        let mut input = InputState::new();

        input.process_mouse_move(&mut bus, 120, 45);
        input.process_mouse_move(&mut bus, 120, 45);
        input.process_mouse_move(&mut bus, 121, 45);

        let fired = &recorder.borrow().fired;
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[1].1.i16(0), 121);
        assert_eq!(fired[1].1.i16(1), 45);
        assert_eq!(input.mouse_position(), (121, 45));
    }

    #[test]
    fn wheel_fires_every_report() {
        let (mut bus, recorder) = recording_bus();
        let mut input = InputState::new();

        input.process_mouse_wheel(&mut bus, 1);
        input.process_mouse_wheel(&mut bus, 1);
        input.process_mouse_wheel(&mut bus, -1);

        let fired = &recorder.borrow().fired;
        assert_eq!(fired.len(), 3);
        assert_eq!(fired[2].1.i8(0), -1);
    }
}
