//! The upstream connection seam.
//!
//! The pump only ever asks three things of its transport: block until
//! the next raw record, hand over any record the kernel has already
//! buffered, and say whether the connection has failed. Everything
//! protocol-shaped lives in `wirepump-proto`; everything socket-shaped
//! lives here.

use std::io::{self, Read};
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, PoisonError};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use wirepump_proto::{tags, EventRecord, FRAME_LEN};

use crate::config::PumpConfig;
use crate::error::PumpError;

/// A connection that delivers protocol records.
///
/// Exactly one reader calls [`wait_for_record`](Transport::wait_for_record)
/// and [`poll_for_queued_record`](Transport::poll_for_queued_record);
/// the remaining methods may be called from the consumer side at any
/// time.
pub trait Transport: Send + Sync {
    /// Block until the next record arrives.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ConnectionClosed` when the peer closes the
    /// stream (or [`interrupt`](Transport::interrupt) forces the read
    /// to end), and `PumpError::ReadFailed`/`MalformedRecord` for I/O
    /// and framing failures.
    fn wait_for_record(&self) -> Result<EventRecord, PumpError>;

    /// Return a record the connection has already buffered, without
    /// blocking.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`wait_for_record`](Transport::wait_for_record).
    fn poll_for_queued_record(&self) -> Result<Option<EventRecord>, PumpError>;

    /// Whether the connection has failed.
    fn has_error(&self) -> bool;

    /// Force a reader blocked in [`wait_for_record`](Transport::wait_for_record)
    /// to return.
    ///
    /// A socket transport can simply shut down its read half. A
    /// transport with no native way to interrupt a blocked read should
    /// instead provoke a benign self-addressed message through the
    /// server, which wakes the reader through the normal delivery path.
    fn interrupt(&self);

    /// Flush any buffered outbound requests. The default is a no-op for
    /// read-only transports.
    fn flush(&self) {}
}

/// Unix domain socket transport.
#[derive(Debug)]
pub struct UnixTransport {
    /// Framed reads; touched only by the reader role.
    io: Mutex<UnixStream>,
    /// Second handle to the same socket for interrupt and error checks
    /// from the consumer side.
    control: UnixStream,
}

impl UnixTransport {
    /// Connect to the display server socket named by the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns the config's resolution errors (`SocketNotSet`,
    /// `SocketNotFound`), `PumpError::ConnectionFailed` if the connect
    /// itself fails, and `PumpError::ConnectionSetup` if the control
    /// handle cannot be duplicated.
    pub fn connect(config: &PumpConfig) -> Result<Self, PumpError> {
        let path = config.resolve_socket_path()?;
        tracing::debug!(path = %path.display(), "connecting to display socket");
        let stream = UnixStream::connect(&path).map_err(|source| PumpError::ConnectionFailed {
            path: path.clone(),
            source,
        })?;
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream (used by tests and demo
    /// servers running over a socketpair).
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ConnectionSetup` if the control handle
    /// cannot be duplicated.
    pub fn from_stream(stream: UnixStream) -> Result<Self, PumpError> {
        let control = stream.try_clone().map_err(PumpError::ConnectionSetup)?;
        Ok(Self {
            io: Mutex::new(stream),
            control,
        })
    }
}

fn map_read_error(error: io::Error) -> PumpError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        PumpError::ConnectionClosed
    } else {
        PumpError::ReadFailed(error)
    }
}

fn read_frame(stream: &mut UnixStream) -> Result<EventRecord, PumpError> {
    let mut bytes = vec![0u8; FRAME_LEN];
    stream.read_exact(&mut bytes).map_err(map_read_error)?;
    if bytes[0] == tags::GENERIC_EVENT {
        let units = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let extra = units as usize * 4;
        if extra > 0 {
            bytes.resize(FRAME_LEN + extra, 0);
            stream
                .read_exact(&mut bytes[FRAME_LEN..])
                .map_err(map_read_error)?;
        }
    }
    Ok(EventRecord::from_bytes(bytes)?)
}

impl Transport for UnixTransport {
    fn wait_for_record(&self) -> Result<EventRecord, PumpError> {
        let mut io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        read_frame(&mut io)
    }

    fn poll_for_queued_record(&self) -> Result<Option<EventRecord>, PumpError> {
        let mut io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let revents = {
            let mut fds = [PollFd::new(io.as_fd(), PollFlags::POLLIN)];
            let ready = poll(&mut fds, PollTimeout::ZERO)
                .map_err(|errno| PumpError::ReadFailed(io::Error::from(errno)))?;
            if ready == 0 {
                return Ok(None);
            }
            fds[0].revents().unwrap_or(PollFlags::empty())
        };
        if revents.contains(PollFlags::POLLIN) {
            return read_frame(&mut io).map(Some);
        }
        if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
            return Err(PumpError::ConnectionClosed);
        }
        Ok(None)
    }

    fn has_error(&self) -> bool {
        matches!(self.control.take_error(), Ok(Some(_)) | Err(_))
    }

    fn interrupt(&self) {
        // Ends any blocked frame read with end-of-stream; the reader
        // then consults its stop flag to tell shutdown from peer loss.
        let _ = self.control.shutdown(Shutdown::Read);
    }
}
