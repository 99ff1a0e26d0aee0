//! Wire-level record model for the wirepump display-protocol client.
//!
//! A display server talks to its clients in fixed-size frames: 32 bytes,
//! tagged by the first byte, with one reserved tag bit marking protocol
//! errors. Extension input frames carry a trailing variable-length
//! payload. This crate owns everything that can be said about a frame
//! without a connection: the [`EventRecord`] container, the closed
//! [`RecordKind`] classification, typed per-kind views, the protocol
//! error/request name tables, and the wraparound-aware [`ServerTime`].
//!
//! The crate is deliberately connection-free so that the pump, tests,
//! and mock servers all share one definition of the wire format.

mod errors;
mod events;
mod record;
pub mod records;
mod time;

pub use errors::{ErrorRecord, RecordError};
pub use events::{
    ClientMessageEvent, ConfigureEvent, CoreInputEvent, DestroyEvent, ExposeEvent,
    ExtendedInputEvent, FocusEvent, MapEvent, MappingEvent, MappingRequest, PropertyEvent,
    SelectionClearEvent, SelectionNotifyEvent, SelectionOwnerEvent, SelectionRequestEvent,
    UnmapEvent,
};
pub use record::{atoms, tags, xi, Atom, EventRecord, ExtendedKind, RecordKind, WindowId, ERROR_BIT, FRAME_LEN};
pub use time::ServerTime;
