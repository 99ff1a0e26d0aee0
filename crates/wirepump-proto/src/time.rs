//! Server timestamps.

/// A 32-bit server timestamp.
///
/// The server's clock wraps roughly every 49 days, so ordering is
/// defined by signed distance rather than plain comparison. The raw
/// value `0` is the protocol's "unset" sentinel and orders below
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerTime(u32);

impl ServerTime {
    pub const UNSET: ServerTime = ServerTime(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    /// Wraparound-aware "newer than".
    ///
    /// An unset `other` is always inferior, so any real timestamp
    /// replaces the sentinel.
    pub fn is_after(self, other: ServerTime) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0 || !other.is_set()
    }
}
