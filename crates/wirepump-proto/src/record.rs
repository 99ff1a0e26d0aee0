//! The opaque protocol record and its classification.
//!
//! Records are immutable once decoded. Ownership moves from the
//! transport to the queue to whichever handler finally consumes the
//! record; nothing ever shares one.

use crate::errors::RecordError;
use crate::time::ServerTime;

/// Length of every fixed frame on the wire. Extension records append
/// `extension_units * 4` bytes after this header.
pub const FRAME_LEN: usize = 32;

/// Tag bit reserved for protocol errors.
pub const ERROR_BIT: u8 = 0x80;

/// Upper bound on the extension payload, in 4-byte units. Anything
/// larger is treated as a malformed frame rather than an allocation
/// request.
const MAX_EXTENSION_UNITS: u32 = 1 << 14;

/// Server-side window identifier.
pub type WindowId = u32;

/// Interned name identifier.
pub type Atom = u32;

/// Event tag values.
pub mod tags {
    pub const KEY_PRESS: u8 = 2;
    pub const KEY_RELEASE: u8 = 3;
    pub const BUTTON_PRESS: u8 = 4;
    pub const BUTTON_RELEASE: u8 = 5;
    pub const MOTION_NOTIFY: u8 = 6;
    pub const ENTER_NOTIFY: u8 = 7;
    pub const LEAVE_NOTIFY: u8 = 8;
    pub const FOCUS_IN: u8 = 9;
    pub const FOCUS_OUT: u8 = 10;
    pub const KEYMAP_NOTIFY: u8 = 11;
    pub const EXPOSE: u8 = 12;
    pub const DESTROY_NOTIFY: u8 = 17;
    pub const UNMAP_NOTIFY: u8 = 18;
    pub const MAP_NOTIFY: u8 = 19;
    pub const CONFIGURE_NOTIFY: u8 = 22;
    pub const PROPERTY_NOTIFY: u8 = 28;
    pub const SELECTION_CLEAR: u8 = 29;
    pub const SELECTION_REQUEST: u8 = 30;
    pub const SELECTION_NOTIFY: u8 = 31;
    pub const CLIENT_MESSAGE: u8 = 33;
    pub const MAPPING_NOTIFY: u8 = 34;
    /// Container for extension events; carries a sub-kind and a
    /// variable-length payload.
    pub const GENERIC_EVENT: u8 = 35;
    /// Selection-ownership change notification (extension).
    pub const SELECTION_OWNER_NOTIFY: u8 = 36;
}

/// Well-known atoms defined by the protocol itself.
pub mod atoms {
    use super::Atom;

    pub const WM_PROTOCOLS: Atom = 68;
    pub const WM_DELETE_WINDOW: Atom = 69;
}

/// Sub-kind values carried by [`tags::GENERIC_EVENT`] frames.
pub mod xi {
    pub const KEY_PRESS: u16 = 2;
    pub const KEY_RELEASE: u16 = 3;
    pub const BUTTON_PRESS: u16 = 4;
    pub const BUTTON_RELEASE: u16 = 5;
    pub const MOTION: u16 = 6;
    pub const ENTER: u16 = 7;
    pub const LEAVE: u16 = 8;
    pub const TOUCH_BEGIN: u16 = 18;
    pub const TOUCH_UPDATE: u16 = 19;
    pub const TOUCH_END: u16 = 20;
}

pub(crate) fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn i16_at(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Closed classification of a decoded record.
///
/// Dispatch sites match on this exhaustively; a tag this crate does not
/// know lands in `Unknown` instead of being silently conflated with
/// anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Protocol error report ([`ERROR_BIT`] set in the tag).
    Error,
    KeyPress,
    KeyRelease,
    ButtonPress,
    ButtonRelease,
    Motion,
    Enter,
    Leave,
    FocusIn,
    FocusOut,
    KeymapNotify,
    Expose,
    DestroyNotify,
    UnmapNotify,
    MapNotify,
    ConfigureNotify,
    PropertyNotify,
    SelectionClear,
    SelectionRequest,
    SelectionNotify,
    ClientMessage,
    MappingNotify,
    SelectionOwnerNotify,
    /// Extension input event, classified by its sub-kind.
    Extended(ExtendedKind),
    Unknown(u8),
}

/// Classification of extension input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedKind {
    KeyPress,
    KeyRelease,
    ButtonPress,
    ButtonRelease,
    Motion,
    Enter,
    Leave,
    TouchBegin,
    TouchUpdate,
    TouchEnd,
    Other(u16),
}

impl ExtendedKind {
    fn from_sub_kind(sub_kind: u16) -> Self {
        match sub_kind {
            xi::KEY_PRESS => Self::KeyPress,
            xi::KEY_RELEASE => Self::KeyRelease,
            xi::BUTTON_PRESS => Self::ButtonPress,
            xi::BUTTON_RELEASE => Self::ButtonRelease,
            xi::MOTION => Self::Motion,
            xi::ENTER => Self::Enter,
            xi::LEAVE => Self::Leave,
            xi::TOUCH_BEGIN => Self::TouchBegin,
            xi::TOUCH_UPDATE => Self::TouchUpdate,
            xi::TOUCH_END => Self::TouchEnd,
            other => Self::Other(other),
        }
    }

    /// Whether this sub-kind is user input (as opposed to device or
    /// hierarchy bookkeeping).
    pub fn is_input(self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// One decoded unit of protocol-level information: an event or an
/// error, still in wire form.
///
/// The frame layout is validated on construction; accessors never
/// re-check lengths.
#[derive(Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub(crate) bytes: Box<[u8]>,
}

impl EventRecord {
    /// Wrap a raw frame, validating its length against the tag.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the frame is shorter than
    /// [`FRAME_LEN`], an extension frame's declared payload disagrees
    /// with the actual length, or the declared payload is absurdly
    /// large.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RecordError> {
        if bytes.len() < FRAME_LEN {
            return Err(RecordError::TooShort { len: bytes.len() });
        }
        let expected = if bytes[0] == tags::GENERIC_EVENT {
            let units = u32_at(&bytes, 4);
            if units > MAX_EXTENSION_UNITS {
                return Err(RecordError::OversizedExtension { units });
            }
            FRAME_LEN + units as usize * 4
        } else {
            FRAME_LEN
        };
        if bytes.len() != expected {
            return Err(RecordError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Raw tag byte, error bit included.
    pub fn tag(&self) -> u8 {
        self.bytes[0]
    }

    /// Tag with the error bit stripped.
    pub fn code(&self) -> u8 {
        self.bytes[0] & !ERROR_BIT
    }

    pub fn is_error(&self) -> bool {
        self.bytes[0] & ERROR_BIT != 0
    }

    /// Kind-specific detail byte (keycode, focus mode, client-message
    /// format, mapping request).
    pub fn detail(&self) -> u8 {
        self.bytes[1]
    }

    pub fn sequence(&self) -> u16 {
        u16_at(&self.bytes, 2)
    }

    /// The whole frame, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> RecordKind {
        if self.is_error() {
            return RecordKind::Error;
        }
        match self.tag() {
            tags::KEY_PRESS => RecordKind::KeyPress,
            tags::KEY_RELEASE => RecordKind::KeyRelease,
            tags::BUTTON_PRESS => RecordKind::ButtonPress,
            tags::BUTTON_RELEASE => RecordKind::ButtonRelease,
            tags::MOTION_NOTIFY => RecordKind::Motion,
            tags::ENTER_NOTIFY => RecordKind::Enter,
            tags::LEAVE_NOTIFY => RecordKind::Leave,
            tags::FOCUS_IN => RecordKind::FocusIn,
            tags::FOCUS_OUT => RecordKind::FocusOut,
            tags::KEYMAP_NOTIFY => RecordKind::KeymapNotify,
            tags::EXPOSE => RecordKind::Expose,
            tags::DESTROY_NOTIFY => RecordKind::DestroyNotify,
            tags::UNMAP_NOTIFY => RecordKind::UnmapNotify,
            tags::MAP_NOTIFY => RecordKind::MapNotify,
            tags::CONFIGURE_NOTIFY => RecordKind::ConfigureNotify,
            tags::PROPERTY_NOTIFY => RecordKind::PropertyNotify,
            tags::SELECTION_CLEAR => RecordKind::SelectionClear,
            tags::SELECTION_REQUEST => RecordKind::SelectionRequest,
            tags::SELECTION_NOTIFY => RecordKind::SelectionNotify,
            tags::CLIENT_MESSAGE => RecordKind::ClientMessage,
            tags::MAPPING_NOTIFY => RecordKind::MappingNotify,
            tags::GENERIC_EVENT => {
                RecordKind::Extended(ExtendedKind::from_sub_kind(u16_at(&self.bytes, 8)))
            }
            tags::SELECTION_OWNER_NOTIFY => RecordKind::SelectionOwnerNotify,
            other => RecordKind::Unknown(other),
        }
    }

    /// The window identifier dispatch routes on, when the kind carries
    /// one.
    pub fn window(&self) -> Option<WindowId> {
        match self.kind() {
            RecordKind::KeyPress
            | RecordKind::KeyRelease
            | RecordKind::ButtonPress
            | RecordKind::ButtonRelease
            | RecordKind::Motion
            | RecordKind::Enter
            | RecordKind::Leave => Some(u32_at(&self.bytes, 12)),
            RecordKind::FocusIn
            | RecordKind::FocusOut
            | RecordKind::Expose
            | RecordKind::ClientMessage
            | RecordKind::PropertyNotify
            | RecordKind::ConfigureNotify
            | RecordKind::MapNotify
            | RecordKind::UnmapNotify
            | RecordKind::DestroyNotify
            | RecordKind::SelectionOwnerNotify => Some(u32_at(&self.bytes, 4)),
            RecordKind::Extended(_) => Some(u32_at(&self.bytes, 16)),
            _ => None,
        }
    }

    /// Server timestamp carried by the record, if its kind defines one
    /// and the field is not the "unset" sentinel.
    pub fn timestamp(&self) -> Option<ServerTime> {
        let raw = match self.kind() {
            RecordKind::KeyPress
            | RecordKind::KeyRelease
            | RecordKind::ButtonPress
            | RecordKind::ButtonRelease
            | RecordKind::Motion
            | RecordKind::Enter
            | RecordKind::Leave
            | RecordKind::SelectionClear
            | RecordKind::SelectionRequest
            | RecordKind::SelectionNotify => u32_at(&self.bytes, 4),
            RecordKind::PropertyNotify => u32_at(&self.bytes, 12),
            RecordKind::SelectionOwnerNotify => u32_at(&self.bytes, 16),
            RecordKind::Extended(_) => u32_at(&self.bytes, 12),
            _ => return None,
        };
        let time = ServerTime::new(raw);
        time.is_set().then_some(time)
    }

    /// Whether this record is direct user input.
    ///
    /// Covers core and extension input plus the delete-window client
    /// message, which a user triggers through the window manager.
    pub fn is_user_input(&self) -> bool {
        match self.kind() {
            RecordKind::KeyPress
            | RecordKind::KeyRelease
            | RecordKind::ButtonPress
            | RecordKind::ButtonRelease
            | RecordKind::Motion
            | RecordKind::Enter
            | RecordKind::Leave => true,
            RecordKind::Extended(kind) => kind.is_input(),
            RecordKind::ClientMessage => {
                self.detail() == 32
                    && u32_at(&self.bytes, 8) == atoms::WM_PROTOCOLS
                    && u32_at(&self.bytes, 12) == atoms::WM_DELETE_WINDOW
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("kind", &self.kind())
            .field("sequence", &self.sequence())
            .field("len", &self.bytes.len())
            .finish()
    }
}
