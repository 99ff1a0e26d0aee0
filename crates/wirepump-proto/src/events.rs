//! Typed views over the fixed per-kind payload layouts.
//!
//! Each view checks the record's kind and copies the handful of fields
//! the payload defines. Frames are length-validated on construction,
//! so field extraction itself cannot fail.

use crate::record::{i16_at, u16_at, u32_at, Atom, EventRecord, ExtendedKind, RecordKind, WindowId};
use crate::time::ServerTime;

/// A damaged region that needs repainting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposeEvent {
    pub window: WindowId,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    /// Number of expose records for the same window still to come.
    pub count: u16,
}

impl ExposeEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        if record.kind() != RecordKind::Expose {
            return None;
        }
        let b = record.as_bytes();
        Some(Self {
            window: u32_at(b, 4),
            x: u16_at(b, 8),
            y: u16_at(b, 10),
            width: u16_at(b, 12),
            height: u16_at(b, 14),
            count: u16_at(b, 16),
        })
    }
}

/// New geometry for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureEvent {
    /// The window the notification was selected on; dispatch routes on
    /// this one.
    pub event_window: WindowId,
    pub window: WindowId,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
}

impl ConfigureEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        if record.kind() != RecordKind::ConfigureNotify {
            return None;
        }
        let b = record.as_bytes();
        Some(Self {
            event_window: u32_at(b, 4),
            window: u32_at(b, 8),
            x: i16_at(b, 12),
            y: i16_at(b, 14),
            width: u16_at(b, 16),
            height: u16_at(b, 18),
            border_width: u16_at(b, 20),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEvent {
    pub event_window: WindowId,
    pub window: WindowId,
}

impl MapEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::MapNotify).then(|| {
            let b = record.as_bytes();
            Self {
                event_window: u32_at(b, 4),
                window: u32_at(b, 8),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmapEvent {
    pub event_window: WindowId,
    pub window: WindowId,
}

impl UnmapEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::UnmapNotify).then(|| {
            let b = record.as_bytes();
            Self {
                event_window: u32_at(b, 4),
                window: u32_at(b, 8),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyEvent {
    pub event_window: WindowId,
    pub window: WindowId,
}

impl DestroyEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::DestroyNotify).then(|| {
            let b = record.as_bytes();
            Self {
                event_window: u32_at(b, 4),
                window: u32_at(b, 8),
            }
        })
    }
}

/// Focus gained or lost; `mode` is the raw focus-transition detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusEvent {
    pub window: WindowId,
    pub mode: u8,
}

impl FocusEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        matches!(record.kind(), RecordKind::FocusIn | RecordKind::FocusOut).then(|| Self {
            window: u32_at(record.as_bytes(), 4),
            mode: record.detail(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyEvent {
    pub window: WindowId,
    pub atom: Atom,
    pub time: ServerTime,
    /// 0 = newly set, 1 = deleted.
    pub state: u8,
}

impl PropertyEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::PropertyNotify).then(|| {
            let b = record.as_bytes();
            Self {
                window: u32_at(b, 4),
                atom: u32_at(b, 8),
                time: ServerTime::new(u32_at(b, 12)),
                state: b[16],
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMessageEvent {
    pub window: WindowId,
    pub message_type: Atom,
    /// Element width of the data field: 8, 16 or 32.
    pub format: u8,
    pub data: [u8; 20],
}

impl ClientMessageEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::ClientMessage).then(|| {
            let b = record.as_bytes();
            let mut data = [0u8; 20];
            data.copy_from_slice(&b[12..32]);
            Self {
                window: u32_at(b, 4),
                message_type: u32_at(b, 8),
                format: record.detail(),
                data,
            }
        })
    }

    /// The i-th 32-bit element of the data field.
    pub fn data32(&self, index: usize) -> u32 {
        u32_at(&self.data, index * 4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionClearEvent {
    pub time: ServerTime,
    pub owner: WindowId,
    pub selection: Atom,
}

impl SelectionClearEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::SelectionClear).then(|| {
            let b = record.as_bytes();
            Self {
                time: ServerTime::new(u32_at(b, 4)),
                owner: u32_at(b, 8),
                selection: u32_at(b, 12),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRequestEvent {
    pub time: ServerTime,
    pub owner: WindowId,
    pub requestor: WindowId,
    pub selection: Atom,
    pub target: Atom,
    pub property: Atom,
}

impl SelectionRequestEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::SelectionRequest).then(|| {
            let b = record.as_bytes();
            Self {
                time: ServerTime::new(u32_at(b, 4)),
                owner: u32_at(b, 8),
                requestor: u32_at(b, 12),
                selection: u32_at(b, 16),
                target: u32_at(b, 20),
                property: u32_at(b, 24),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionNotifyEvent {
    pub time: ServerTime,
    pub requestor: WindowId,
    pub selection: Atom,
    pub target: Atom,
    pub property: Atom,
}

impl SelectionNotifyEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::SelectionNotify).then(|| {
            let b = record.as_bytes();
            Self {
                time: ServerTime::new(u32_at(b, 4)),
                requestor: u32_at(b, 8),
                selection: u32_at(b, 12),
                target: u32_at(b, 16),
                property: u32_at(b, 20),
            }
        })
    }
}

/// Ownership of a selection changed server-side (extension
/// notification; fires even for ownership transfers this client never
/// requested).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOwnerEvent {
    pub window: WindowId,
    pub owner: WindowId,
    pub selection: Atom,
    pub time: ServerTime,
}

impl SelectionOwnerEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::SelectionOwnerNotify).then(|| {
            let b = record.as_bytes();
            Self {
                window: u32_at(b, 4),
                owner: u32_at(b, 8),
                selection: u32_at(b, 12),
                time: ServerTime::new(u32_at(b, 16)),
            }
        })
    }
}

/// What part of the keyboard/pointer mapping changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingRequest {
    Modifier,
    Keyboard,
    Pointer,
    Unknown(u8),
}

impl From<u8> for MappingRequest {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Modifier,
            1 => Self::Keyboard,
            2 => Self::Pointer,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEvent {
    pub request: MappingRequest,
    pub first_keycode: u8,
    pub count: u8,
}

impl MappingEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        (record.kind() == RecordKind::MappingNotify).then(|| {
            let b = record.as_bytes();
            Self {
                request: MappingRequest::from(b[4]),
                first_keycode: b[5],
                count: b[6],
            }
        })
    }
}

/// Core-protocol input: key, button, motion, enter, leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreInputEvent {
    pub kind: RecordKind,
    /// Keycode or button number.
    pub detail: u8,
    pub time: ServerTime,
    pub root: WindowId,
    pub window: WindowId,
    pub child: WindowId,
    pub x: i16,
    pub y: i16,
    pub state: u16,
}

impl CoreInputEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        let kind = record.kind();
        matches!(
            kind,
            RecordKind::KeyPress
                | RecordKind::KeyRelease
                | RecordKind::ButtonPress
                | RecordKind::ButtonRelease
                | RecordKind::Motion
                | RecordKind::Enter
                | RecordKind::Leave
        )
        .then(|| {
            let b = record.as_bytes();
            Self {
                kind,
                detail: record.detail(),
                time: ServerTime::new(u32_at(b, 4)),
                root: u32_at(b, 8),
                window: u32_at(b, 12),
                child: u32_at(b, 16),
                x: i16_at(b, 20),
                y: i16_at(b, 22),
                state: u16_at(b, 24),
            }
        })
    }
}

/// Extension input event header; the device-specific payload stays in
/// the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedInputEvent {
    pub kind: ExtendedKind,
    pub time: ServerTime,
    pub window: WindowId,
    pub detail: u32,
}

impl ExtendedInputEvent {
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        match record.kind() {
            RecordKind::Extended(kind) => {
                let b = record.as_bytes();
                Some(Self {
                    kind,
                    time: ServerTime::new(u32_at(b, 12)),
                    window: u32_at(b, 16),
                    detail: u32_at(b, 20),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records;

    #[test]
    fn expose_view_decodes_region() {
        let record = records::expose(9, 10, 20, 300, 400, 1);
        let ev = ExposeEvent::from_record(&record).expect("expose view");
        assert_eq!(ev.window, 9);
        assert_eq!((ev.x, ev.y, ev.width, ev.height), (10, 20, 300, 400));
        assert_eq!(ev.count, 1);
        // Kind mismatch yields no view.
        assert!(ConfigureEvent::from_record(&record).is_none());
    }

    #[test]
    fn configure_view_keeps_both_windows() {
        let record = records::configure(5, 6, -3, 7, 640, 480);
        let ev = ConfigureEvent::from_record(&record).expect("configure view");
        assert_eq!(ev.event_window, 5);
        assert_eq!(ev.window, 6);
        assert_eq!((ev.x, ev.y), (-3, 7));
        assert_eq!((ev.width, ev.height), (640, 480));
    }

    #[test]
    fn client_message_data32_addresses_elements() {
        let record = records::delete_window_message(8);
        let ev = ClientMessageEvent::from_record(&record).expect("client message view");
        assert_eq!(ev.window, 8);
        assert_eq!(ev.format, 32);
        assert_eq!(ev.message_type, crate::atoms::WM_PROTOCOLS);
        assert_eq!(ev.data32(0), crate::atoms::WM_DELETE_WINDOW);
    }

    #[test]
    fn selection_request_fields() {
        let record = records::selection_request(1, 2, 3, 4, 5, 99);
        let ev = SelectionRequestEvent::from_record(&record).expect("selection request");
        assert_eq!(ev.owner, 1);
        assert_eq!(ev.requestor, 2);
        assert_eq!(ev.selection, 3);
        assert_eq!(ev.target, 4);
        assert_eq!(ev.property, 5);
        assert_eq!(ev.time, ServerTime::new(99));
    }

    #[test]
    fn core_input_view_covers_motion() {
        let record = records::motion(11, 120, -40, 1000);
        let ev = CoreInputEvent::from_record(&record).expect("motion view");
        assert_eq!(ev.kind, RecordKind::Motion);
        assert_eq!(ev.window, 11);
        assert_eq!((ev.x, ev.y), (120, -40));
        assert_eq!(ev.time, ServerTime::new(1000));
    }

    #[test]
    fn extended_input_view() {
        let record = records::extended(crate::xi::ENTER, 13, 2, 500);
        let ev = ExtendedInputEvent::from_record(&record).expect("extended view");
        assert_eq!(ev.kind, ExtendedKind::Enter);
        assert_eq!(ev.window, 13);
        assert_eq!(ev.detail, 2);
        assert_eq!(ev.time, ServerTime::new(500));
    }

    #[test]
    fn mapping_view() {
        let record = records::mapping_notify(MappingRequest::Keyboard, 8, 240);
        let ev = MappingEvent::from_record(&record).expect("mapping view");
        assert_eq!(ev.request, MappingRequest::Keyboard);
        assert_eq!(ev.first_keycode, 8);
        assert_eq!(ev.count, 240);
    }
}
