//! Synchronous event bus connecting engine subsystems and the application
//!
//! Events are identified by a numeric [`EventCode`] and carry a fixed
//! 16-byte [`EventContext`] payload. Listeners register per code and are
//! invoked in registration order when that code fires; the first listener
//! to report the event handled stops dispatch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Highest number of distinct event codes the bus accepts.
pub const MAX_EVENT_CODES: u16 = 16384;

/// Identifies a kind of event on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode(pub u16);

/// Event codes reserved by the engine. Applications should define their own
/// codes at [`code::APPLICATION_BASE`] and above.
pub mod code {
    use super::EventCode;

    /// Shut the application down at the end of the current frame. No payload.
    pub const APPLICATION_QUIT: EventCode = EventCode(0x01);
    /// A key went down. `u16[0]` holds the key code.
    pub const KEY_PRESSED: EventCode = EventCode(0x02);
    /// A key came up. `u16[0]` holds the key code.
    pub const KEY_RELEASED: EventCode = EventCode(0x03);
    /// A mouse button went down. `u16[0]` holds the button index.
    pub const BUTTON_PRESSED: EventCode = EventCode(0x04);
    /// A mouse button came up. `u16[0]` holds the button index.
    pub const BUTTON_RELEASED: EventCode = EventCode(0x05);
    /// The cursor moved. `i16[0]` and `i16[1]` hold the new position.
    pub const MOUSE_MOVED: EventCode = EventCode(0x06);
    /// The wheel scrolled. `i8[0]` holds the normalized delta.
    pub const MOUSE_WHEEL: EventCode = EventCode(0x07);
    /// The framebuffer changed size. `u16[0]` and `u16[1]` hold width and height.
    pub const RESIZED: EventCode = EventCode(0x08);
    /// First code available for application-defined events.
    pub const APPLICATION_BASE: EventCode = EventCode(0x100);
}

/// Fixed-size event payload viewed through typed lanes
///
/// The same 16 bytes back every lane, so a value written as `u32` lane 0
/// occupies `u16` lanes 0 and 1. Senders and receivers agree on the layout
/// per event code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventContext {
    bytes: [u8; 16],
}

macro_rules! context_lanes {
    ($get:ident, $set:ident, $ty:ty, $lanes:expr) => {
        /// Read lane `lane` of the payload.
        ///
        /// # Panics
        /// Panics if `lane` is out of range for the lane width.
        pub fn $get(&self, lane: usize) -> $ty {
            assert!(lane < $lanes, "lane {} out of range", lane);
            let width = std::mem::size_of::<$ty>();
            let start = lane * width;
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(&self.bytes[start..start + width]);
            <$ty>::from_ne_bytes(raw)
        }

        /// Write lane `lane` of the payload.
        ///
        /// # Panics
        /// Panics if `lane` is out of range for the lane width.
        pub fn $set(&mut self, lane: usize, value: $ty) {
            assert!(lane < $lanes, "lane {} out of range", lane);
            let width = std::mem::size_of::<$ty>();
            let start = lane * width;
            self.bytes[start..start + width].copy_from_slice(&value.to_ne_bytes());
        }
    };
}

impl EventContext {
    context_lanes!(u64, set_u64, u64, 2);
    context_lanes!(u32, set_u32, u32, 4);
    context_lanes!(u16, set_u16, u16, 8);
    context_lanes!(u8, set_u8, u8, 16);
    context_lanes!(i16, set_i16, i16, 8);
    context_lanes!(i8, set_i8, i8, 16);
}

/// Identifies who registered a listener or sent an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(pub u32);

impl ListenerId {
    /// No particular sender.
    pub const NONE: ListenerId = ListenerId(0);
    /// The engine driver.
    pub const ENGINE: ListenerId = ListenerId(1);
    /// The input tracker.
    pub const INPUT: ListenerId = ListenerId(2);
    /// The application layer.
    pub const APPLICATION: ListenerId = ListenerId(3);
}

/// Receives events fired on the bus.
pub trait EventListener {
    /// Handle `code` sent by `sender`. Return `true` to stop dispatch to
    /// listeners registered after this one.
    fn on_event(
        &mut self,
        bus: &mut EventBus,
        code: EventCode,
        sender: ListenerId,
        context: &EventContext,
    ) -> bool;
}

/// Shared handle to a listener, cloneable into the bus registry.
pub type SharedListener = Rc<RefCell<dyn EventListener>>;

#[derive(Clone)]
struct Registration {
    listener: ListenerId,
    handler: SharedListener,
}

/// Registry of listeners keyed by event code
///
/// Dispatch works on a snapshot of the registration list, so listeners may
/// register and unregister from inside a handler; such changes take effect
/// from the next fire onward.
#[derive(Default)]
pub struct EventBus {
    registrations: HashMap<EventCode, Vec<Registration>>,
}

impl EventBus {
    /// Create a bus with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `listener` for events of `code`.
    ///
    /// Returns `false` if the code is out of range or the same handler is
    /// already registered for the code under the same listener id.
    pub fn register(
        &mut self,
        code: EventCode,
        listener: ListenerId,
        handler: SharedListener,
    ) -> bool {
        if code.0 >= MAX_EVENT_CODES {
            log::warn!(
                "Rejecting registration for out-of-range event code {:#x}",
                code.0
            );
            return false;
        }

        let entries = self.registrations.entry(code).or_default();
        let duplicate = entries
            .iter()
            .any(|r| r.listener == listener && Rc::ptr_eq(&r.handler, &handler));
        if duplicate {
            log::warn!(
                "Listener {:?} already registered for event code {:#x}",
                listener,
                code.0
            );
            return false;
        }

        entries.push(Registration { listener, handler });
        true
    }

    /// Remove a registration made with [`EventBus::register`].
    ///
    /// Returns `false` when no matching registration exists.
    pub fn unregister(
        &mut self,
        code: EventCode,
        listener: ListenerId,
        handler: &SharedListener,
    ) -> bool {
        let Some(entries) = self.registrations.get_mut(&code) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|r| !(r.listener == listener && Rc::ptr_eq(&r.handler, handler)));
        before != entries.len()
    }

    /// Dispatch `code` with `context` to every registered listener in
    /// registration order.
    ///
    /// Returns `true` as soon as a listener reports the event handled;
    /// returns `false` if no listener handled it or none were registered.
    pub fn fire(&mut self, code: EventCode, sender: ListenerId, context: &EventContext) -> bool {
        let Some(entries) = self.registrations.get(&code) else {
            return false;
        };
        let snapshot: Vec<Registration> = entries.clone();

        for registration in snapshot {
            let Ok(mut handler) = registration.handler.try_borrow_mut() else {
                log::warn!(
                    "Listener {:?} re-entered dispatch of event code {:#x}, skipping",
                    registration.listener,
                    code.0
                );
                continue;
            };
            if handler.on_event(self, code, sender, context) {
                return true;
            }
        }

        false
    }

    /// Number of listeners currently registered for `code`.
    pub fn listener_count(&self, code: EventCode) -> usize {
        self.registrations.get(&code).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingListener {
        seen: Vec<(EventCode, ListenerId)>,
        handle: bool,
    }

    impl CountingListener {
        fn shared(handle: bool) -> Rc<RefCell<CountingListener>> {
            Rc::new(RefCell::new(CountingListener {
                seen: Vec::new(),
                handle,
            }))
        }
    }

    impl EventListener for CountingListener {
        fn on_event(
            &mut self,
            _bus: &mut EventBus,
            code: EventCode,
            sender: ListenerId,
            _context: &EventContext,
        ) -> bool {
            self.seen.push((code, sender));
            self.handle
        }
    }

    #[test]
    fn context_lanes_share_storage() {
        let mut context = EventContext::default();
        context.set_u32(0, 0xAABB_CCDD);
        assert_eq!(context.u32(0), 0xAABB_CCDD);

        context.set_u16(2, 800);
        context.set_u16(3, 600);
        assert_eq!(context.u16(2), 800);
        assert_eq!(context.u16(3), 600);
        assert_eq!(context.u32(0), 0xAABB_CCDD);

        context.set_i8(15, -4);
        assert_eq!(context.i8(15), -4);
    }

    #[test]
    fn fire_without_listeners_reports_unhandled() {
        let mut bus = EventBus::new();
        assert!(!bus.fire(code::RESIZED, ListenerId::ENGINE, &EventContext::default()));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut bus = EventBus::new();
        let listener = CountingListener::shared(false);
        let shared: SharedListener = listener.clone();

        assert!(bus.register(code::KEY_PRESSED, ListenerId::ENGINE, shared.clone()));
        assert!(!bus.register(code::KEY_PRESSED, ListenerId::ENGINE, shared));
        assert_eq!(bus.listener_count(code::KEY_PRESSED), 1);
    }

    #[test]
    fn out_of_range_code_is_rejected() {
        let mut bus = EventBus::new();
        let listener = CountingListener::shared(false);
        assert!(!bus.register(EventCode(MAX_EVENT_CODES), ListenerId::ENGINE, listener));
    }

    #[test]
    fn handled_event_stops_dispatch() {
        let mut bus = EventBus::new();
        let first = CountingListener::shared(true);
        let second = CountingListener::shared(false);
        bus.register(code::APPLICATION_QUIT, ListenerId::ENGINE, first.clone());
        bus.register(code::APPLICATION_QUIT, ListenerId::APPLICATION, second.clone());

        let handled = bus.fire(
            code::APPLICATION_QUIT,
            ListenerId::INPUT,
            &EventContext::default(),
        );
        assert!(handled);
        assert_eq!(first.borrow().seen.len(), 1);
        assert_eq!(first.borrow().seen[0], (code::APPLICATION_QUIT, ListenerId::INPUT));
        assert!(second.borrow().seen.is_empty());
    }

    #[test]
    fn unhandled_event_visits_every_listener() {
        let mut bus = EventBus::new();
        let first = CountingListener::shared(false);
        let second = CountingListener::shared(false);
        bus.register(code::MOUSE_MOVED, ListenerId::ENGINE, first.clone());
        bus.register(code::MOUSE_MOVED, ListenerId::APPLICATION, second.clone());

        assert!(!bus.fire(code::MOUSE_MOVED, ListenerId::INPUT, &EventContext::default()));
        assert_eq!(first.borrow().seen.len(), 1);
        assert_eq!(second.borrow().seen.len(), 1);
    }

    #[test]
    fn unregister_removes_only_the_matching_registration() {
        let mut bus = EventBus::new();
        let kept = CountingListener::shared(false);
        let removed = CountingListener::shared(false);
        let removed_shared: SharedListener = removed.clone();
        bus.register(code::KEY_RELEASED, ListenerId::ENGINE, kept.clone());
        bus.register(code::KEY_RELEASED, ListenerId::APPLICATION, removed_shared.clone());

        assert!(bus.unregister(code::KEY_RELEASED, ListenerId::APPLICATION, &removed_shared));
        assert!(!bus.unregister(code::KEY_RELEASED, ListenerId::APPLICATION, &removed_shared));

        bus.fire(code::KEY_RELEASED, ListenerId::INPUT, &EventContext::default());
        assert_eq!(kept.borrow().seen.len(), 1);
        assert!(removed.borrow().seen.is_empty());
    }

    struct ChainListener {
        fired: bool,
    }

    impl EventListener for ChainListener {
        fn on_event(
            &mut self,
            bus: &mut EventBus,
            _code: EventCode,
            _sender: ListenerId,
            _context: &EventContext,
        ) -> bool {
            self.fired = bus.fire(
                code::APPLICATION_QUIT,
                ListenerId::APPLICATION,
                &EventContext::default(),
            );
            true
        }
    }

    #[test]
    fn listener_can_fire_other_events_during_dispatch() {
        let mut bus = EventBus::new();
        let quit = CountingListener::shared(true);
        let chain = Rc::new(RefCell::new(ChainListener { fired: false }));
        bus.register(code::APPLICATION_QUIT, ListenerId::ENGINE, quit.clone());
        bus.register(code::KEY_PRESSED, ListenerId::APPLICATION, chain.clone());

        assert!(bus.fire(code::KEY_PRESSED, ListenerId::INPUT, &EventContext::default()));
        assert!(chain.borrow().fired);
        assert_eq!(quit.borrow().seen.len(), 1);
    }

    struct SelfFiringListener {
        depth: u32,
    }

    impl EventListener for SelfFiringListener {
        fn on_event(
            &mut self,
            bus: &mut EventBus,
            code: EventCode,
            _sender: ListenerId,
            _context: &EventContext,
        ) -> bool {
            self.depth += 1;
            if self.depth == 1 {
                bus.fire(code, ListenerId::APPLICATION, &EventContext::default());
            }
            true
        }
    }

    #[test]
    fn listener_firing_its_own_code_is_skipped_not_deadlocked() {
        let mut bus = EventBus::new();
        let listener = Rc::new(RefCell::new(SelfFiringListener { depth: 0 }));
        bus.register(code::APPLICATION_BASE, ListenerId::APPLICATION, listener.clone());

        assert!(bus.fire(
            code::APPLICATION_BASE,
            ListenerId::ENGINE,
            &EventContext::default()
        ));
        assert_eq!(listener.borrow().depth, 1);
    }
}
