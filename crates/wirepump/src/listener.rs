//! Capability traits the dispatcher routes into.
//!
//! Window objects register a [`WindowEventListener`] per window id;
//! every callback defaults to a no-op so implementations only pick up
//! the events they care about. Subsystems that are not windows
//! (selection transfer, keyboard mapping, input decoding) hang off the
//! connection as fixed handlers.

use wirepump_proto::{
    ClientMessageEvent, ConfigureEvent, CoreInputEvent, DestroyEvent, EventRecord, ExposeEvent,
    ExtendedInputEvent, FocusEvent, MapEvent, MappingEvent, PropertyEvent, SelectionClearEvent,
    SelectionOwnerEvent, SelectionRequestEvent, UnmapEvent,
};

/// Per-window event callbacks.
///
/// Listeners are owned by the window layer; the dispatcher only looks
/// them up by window id. Implementations needing mutable state use
/// interior mutability, since a listener may be registered for several
/// windows.
pub trait WindowEventListener {
    /// Raw pre-filter, called before the typed callback. Returning
    /// true swallows the record.
    fn handle_native(&self, _record: &EventRecord) -> bool {
        false
    }

    fn handle_expose(&self, _event: &ExposeEvent) {}
    fn handle_configure(&self, _event: &ConfigureEvent) {}
    fn handle_map(&self, _event: &MapEvent) {}
    fn handle_unmap(&self, _event: &UnmapEvent) {}
    fn handle_destroy(&self, _event: &DestroyEvent) {}
    fn handle_client_message(&self, _event: &ClientMessageEvent) {}
    fn handle_focus_in(&self, _event: &FocusEvent) {}
    fn handle_focus_out(&self, _event: &FocusEvent) {}
    fn handle_property(&self, _event: &PropertyEvent) {}
    fn handle_enter_leave(&self, _event: &ExtendedInputEvent) {}
}

/// Selection/clipboard protocol seam.
///
/// The selection machinery is a consumer of the pump in its own right:
/// it answers requests routed here and inspects pending records through
/// the peek interface while waiting for transfers.
pub trait SelectionHandler {
    fn handle_selection_request(&mut self, _event: &SelectionRequestEvent) {}
    fn handle_selection_clear(&mut self, _event: &SelectionClearEvent) {}
    fn handle_owner_change(&mut self, _event: &SelectionOwnerEvent) {}

    /// First refusal on property notifications; returning true stops
    /// them from reaching the window listener.
    fn handle_property_notify(&mut self, _event: &PropertyEvent) -> bool {
        false
    }
}

/// Keyboard mapping seam.
pub trait KeymapHandler {
    /// The server-side keyboard/pointer mapping changed.
    fn handle_mapping_change(&mut self, _event: &MappingEvent) {}

    /// Keyboard state snapshot delivered on focus changes; the bitmap
    /// stays in the raw record.
    fn handle_keymap_state(&mut self, _record: &EventRecord) {}
}

/// Input decoding seam for core and extension devices.
pub trait InputHandler {
    fn handle_core_input(&mut self, _event: &CoreInputEvent) {}
    fn handle_extended_input(&mut self, _event: &ExtendedInputEvent) {}
}

/// Externally registered filter over every record, ahead of normal
/// dispatch. Returning true swallows the record.
pub trait RecordFilter {
    fn filter(&mut self, record: &EventRecord) -> bool;
}
