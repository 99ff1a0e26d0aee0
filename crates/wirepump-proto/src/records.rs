//! Record constructors.
//!
//! Builds well-formed wire frames for the other side of the
//! conversation: tests, demo servers, and anything that needs to
//! synthesize a record. Builders always produce frames that pass
//! [`EventRecord::from_bytes`] validation, so construction is
//! infallible.

use crate::events::MappingRequest;
use crate::record::{atoms, tags, Atom, EventRecord, WindowId, FRAME_LEN};

fn frame(tag: u8, detail: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; FRAME_LEN];
    bytes[0] = tag;
    bytes[1] = detail;
    bytes
}

fn put_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_i16(bytes: &mut [u8], at: usize, value: i16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn finish(bytes: Vec<u8>) -> EventRecord {
    EventRecord {
        bytes: bytes.into_boxed_slice(),
    }
}

pub fn expose(window: WindowId, x: u16, y: u16, width: u16, height: u16, count: u16) -> EventRecord {
    let mut b = frame(tags::EXPOSE, 0);
    put_u32(&mut b, 4, window);
    put_u16(&mut b, 8, x);
    put_u16(&mut b, 10, y);
    put_u16(&mut b, 12, width);
    put_u16(&mut b, 14, height);
    put_u16(&mut b, 16, count);
    finish(b)
}

pub fn configure(
    event_window: WindowId,
    window: WindowId,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
) -> EventRecord {
    let mut b = frame(tags::CONFIGURE_NOTIFY, 0);
    put_u32(&mut b, 4, event_window);
    put_u32(&mut b, 8, window);
    put_i16(&mut b, 12, x);
    put_i16(&mut b, 14, y);
    put_u16(&mut b, 16, width);
    put_u16(&mut b, 18, height);
    finish(b)
}

fn windowed_pair(tag: u8, event_window: WindowId, window: WindowId) -> EventRecord {
    let mut b = frame(tag, 0);
    put_u32(&mut b, 4, event_window);
    put_u32(&mut b, 8, window);
    finish(b)
}

pub fn map_notify(event_window: WindowId, window: WindowId) -> EventRecord {
    windowed_pair(tags::MAP_NOTIFY, event_window, window)
}

pub fn unmap_notify(event_window: WindowId, window: WindowId) -> EventRecord {
    windowed_pair(tags::UNMAP_NOTIFY, event_window, window)
}

pub fn destroy_notify(event_window: WindowId, window: WindowId) -> EventRecord {
    windowed_pair(tags::DESTROY_NOTIFY, event_window, window)
}

pub fn focus_in(window: WindowId, mode: u8) -> EventRecord {
    let mut b = frame(tags::FOCUS_IN, mode);
    put_u32(&mut b, 4, window);
    finish(b)
}

pub fn focus_out(window: WindowId, mode: u8) -> EventRecord {
    let mut b = frame(tags::FOCUS_OUT, mode);
    put_u32(&mut b, 4, window);
    finish(b)
}

pub fn property_notify(window: WindowId, atom: Atom, time: u32, state: u8) -> EventRecord {
    let mut b = frame(tags::PROPERTY_NOTIFY, 0);
    put_u32(&mut b, 4, window);
    put_u32(&mut b, 8, atom);
    put_u32(&mut b, 12, time);
    b[16] = state;
    finish(b)
}

pub fn selection_clear(owner: WindowId, selection: Atom, time: u32) -> EventRecord {
    let mut b = frame(tags::SELECTION_CLEAR, 0);
    put_u32(&mut b, 4, time);
    put_u32(&mut b, 8, owner);
    put_u32(&mut b, 12, selection);
    finish(b)
}

pub fn selection_request(
    owner: WindowId,
    requestor: WindowId,
    selection: Atom,
    target: Atom,
    property: Atom,
    time: u32,
) -> EventRecord {
    let mut b = frame(tags::SELECTION_REQUEST, 0);
    put_u32(&mut b, 4, time);
    put_u32(&mut b, 8, owner);
    put_u32(&mut b, 12, requestor);
    put_u32(&mut b, 16, selection);
    put_u32(&mut b, 20, target);
    put_u32(&mut b, 24, property);
    finish(b)
}

pub fn selection_notify(
    requestor: WindowId,
    selection: Atom,
    target: Atom,
    property: Atom,
    time: u32,
) -> EventRecord {
    let mut b = frame(tags::SELECTION_NOTIFY, 0);
    put_u32(&mut b, 4, time);
    put_u32(&mut b, 8, requestor);
    put_u32(&mut b, 12, selection);
    put_u32(&mut b, 16, target);
    put_u32(&mut b, 20, property);
    finish(b)
}

pub fn selection_owner_notify(
    window: WindowId,
    owner: WindowId,
    selection: Atom,
    time: u32,
) -> EventRecord {
    let mut b = frame(tags::SELECTION_OWNER_NOTIFY, 0);
    put_u32(&mut b, 4, window);
    put_u32(&mut b, 8, owner);
    put_u32(&mut b, 12, selection);
    put_u32(&mut b, 16, time);
    finish(b)
}

pub fn client_message(
    window: WindowId,
    message_type: Atom,
    format: u8,
    data: [u8; 20],
) -> EventRecord {
    let mut b = frame(tags::CLIENT_MESSAGE, format);
    put_u32(&mut b, 4, window);
    put_u32(&mut b, 8, message_type);
    b[12..32].copy_from_slice(&data);
    finish(b)
}

/// The window manager asked this window to close.
pub fn delete_window_message(window: WindowId) -> EventRecord {
    let mut data = [0u8; 20];
    data[0..4].copy_from_slice(&atoms::WM_DELETE_WINDOW.to_le_bytes());
    client_message(window, atoms::WM_PROTOCOLS, 32, data)
}

pub fn mapping_notify(request: MappingRequest, first_keycode: u8, count: u8) -> EventRecord {
    let raw = match request {
        MappingRequest::Modifier => 0,
        MappingRequest::Keyboard => 1,
        MappingRequest::Pointer => 2,
        MappingRequest::Unknown(other) => other,
    };
    let mut b = frame(tags::MAPPING_NOTIFY, 0);
    b[4] = raw;
    b[5] = first_keycode;
    b[6] = count;
    finish(b)
}

/// Keyboard state snapshot; `keys` is a bitmap of held keycodes,
/// truncated to the 31 bytes the frame can carry.
pub fn keymap_notify(keys: &[u8]) -> EventRecord {
    let mut b = frame(tags::KEYMAP_NOTIFY, 0);
    let len = keys.len().min(FRAME_LEN - 1);
    b[1..1 + len].copy_from_slice(&keys[..len]);
    finish(b)
}

fn core_input(tag: u8, detail: u8, window: WindowId, x: i16, y: i16, time: u32) -> EventRecord {
    let mut b = frame(tag, detail);
    put_u32(&mut b, 4, time);
    put_u32(&mut b, 12, window);
    put_i16(&mut b, 20, x);
    put_i16(&mut b, 22, y);
    finish(b)
}

pub fn motion(window: WindowId, x: i16, y: i16, time: u32) -> EventRecord {
    core_input(tags::MOTION_NOTIFY, 0, window, x, y, time)
}

pub fn key_press(window: WindowId, keycode: u8, time: u32) -> EventRecord {
    core_input(tags::KEY_PRESS, keycode, window, 0, 0, time)
}

pub fn key_release(window: WindowId, keycode: u8, time: u32) -> EventRecord {
    core_input(tags::KEY_RELEASE, keycode, window, 0, 0, time)
}

pub fn button_press(window: WindowId, button: u8, time: u32) -> EventRecord {
    core_input(tags::BUTTON_PRESS, button, window, 0, 0, time)
}

pub fn button_release(window: WindowId, button: u8, time: u32) -> EventRecord {
    core_input(tags::BUTTON_RELEASE, button, window, 0, 0, time)
}

pub fn enter_notify(window: WindowId, time: u32) -> EventRecord {
    core_input(tags::ENTER_NOTIFY, 0, window, 0, 0, time)
}

pub fn leave_notify(window: WindowId, time: u32) -> EventRecord {
    core_input(tags::LEAVE_NOTIFY, 0, window, 0, 0, time)
}

/// Extension input frame with no trailing payload.
pub fn extended(sub_kind: u16, window: WindowId, detail: u32, time: u32) -> EventRecord {
    extended_with_payload(sub_kind, window, detail, time, &[])
}

/// Extension input frame with a trailing payload; `payload` length must
/// be a multiple of 4 (the wire counts it in 4-byte units).
pub fn extended_with_payload(
    sub_kind: u16,
    window: WindowId,
    detail: u32,
    time: u32,
    payload: &[u8],
) -> EventRecord {
    debug_assert!(payload.len() % 4 == 0, "extension payload is counted in 4-byte units");
    let mut b = frame(tags::GENERIC_EVENT, 0);
    put_u32(&mut b, 4, (payload.len() / 4) as u32);
    put_u16(&mut b, 8, sub_kind);
    put_u32(&mut b, 12, time);
    put_u32(&mut b, 16, window);
    put_u32(&mut b, 20, detail);
    b.extend_from_slice(payload);
    finish(b)
}

pub fn extended_motion(window: WindowId, time: u32) -> EventRecord {
    extended(crate::record::xi::MOTION, window, 0, time)
}

pub fn error(
    error_code: u8,
    sequence: u16,
    resource_id: u32,
    major_code: u8,
    minor_code: u16,
) -> EventRecord {
    let mut b = frame(crate::record::ERROR_BIT | error_code, 0);
    put_u16(&mut b, 2, sequence);
    put_u32(&mut b, 4, resource_id);
    put_u16(&mut b, 8, minor_code);
    b[10] = major_code;
    finish(b)
}
