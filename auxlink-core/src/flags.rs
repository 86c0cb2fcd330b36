//! Receive-complete flags shared with the transport's completion context.

use auxlink_proto::Channel;
use portable_atomic::{AtomicBool, Ordering};

/// One "frame fully received" flag per channel.
///
/// The transport's completion interrupt calls [`mark_complete`] after the
/// whole frame has landed in the channel's buffer. The engine observes the
/// flag and clears it before acting on the frame. A transport implementation
/// typically keeps one of these in a `static` and exposes it through
/// [`Transport::is_fully_received`] / [`Transport::clear_fully_received`].
///
/// [`mark_complete`]: ReceiveFlags::mark_complete
/// [`Transport::is_fully_received`]: crate::Transport::is_fully_received
/// [`Transport::clear_fully_received`]: crate::Transport::clear_fully_received
pub struct ReceiveFlags {
    complete: [AtomicBool; 3],
}

impl ReceiveFlags {
    pub const fn new() -> Self {
        Self {
            complete: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        }
    }

    /// Called from the completion context once a frame has fully landed.
    #[inline]
    pub fn mark_complete(&self, channel: Channel) {
        self.complete[channel.index()].store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_complete(&self, channel: Channel) -> bool {
        self.complete[channel.index()].load(Ordering::Acquire)
    }

    #[inline]
    pub fn clear(&self, channel: Channel) {
        self.complete[channel.index()].store(false, Ordering::Release);
    }

    /// Clear every channel, for receive (re)initialization.
    pub fn reset(&self) {
        for flag in &self.complete {
            flag.store(false, Ordering::Release);
        }
    }
}

impl Default for ReceiveFlags {
    fn default() -> Self {
        Self::new()
    }
}
