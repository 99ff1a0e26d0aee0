//! wirepump — cross-thread event pump for a display-server wire
//! protocol.
//!
//! A dedicated reader thread blocks on the connection and appends
//! decoded records to a lock-minimized queue; the application's control
//! loop drains, coalesces, and dispatches them to per-window listeners
//! and subsystem handlers. Independent peekers can scan the pending
//! backlog non-destructively before dispatch consumes it.
//!
//! The moving parts, upstream to downstream:
//!
//! ```text
//! +-----------+     +--------------+     +------------+     +-----------+
//! | transport | --> | reader task  | --> | EventQueue | --> | Connection|
//! | (socket)  |     | (blocks/     |     | (SPSC list |     | (drain /  |
//! |           |     |  appends)    |     |  + peekers)|     |  dispatch)|
//! +-----------+     +--------------+     +------------+     +-----------+
//! ```
//!
//! Typical use: [`Connection::connect`] with a [`PumpConfig`], register
//! a [`WindowEventListener`] per window, then call
//! [`Connection::process_events`] from the control loop.

mod config;
mod dispatch;
mod error;
mod listener;
mod queue;
mod transport;

pub use config::{PumpConfig, CONFIG_ENV, NO_COALESCE_ENV, SOCKET_ENV};
pub use dispatch::Connection;
pub use error::PumpError;
pub use listener::{
    InputHandler, KeymapHandler, RecordFilter, SelectionHandler, WindowEventListener,
};
pub use queue::{DrainMode, EventQueue, PeekMode, PeekerId, WakeupHook, POOL_SIZE};
pub use transport::{Transport, UnixTransport};
