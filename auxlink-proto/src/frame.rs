//! Fixed-size link frame and channel classification.

use crate::ids::MessageType;

/// Total size of every frame on the wire, in bytes.
pub const FRAME_SIZE: usize = 544;

/// Size of the `message_type` + `payload_length1` header.
pub const HEADER_SIZE: usize = 4;

/// Size of the payload area following the header.
pub const PAYLOAD_CAPACITY: usize = FRAME_SIZE - HEADER_SIZE;

/// Byte value filling every position of a recovery-reboot marker frame.
pub const RECOVERY_SENTINEL: u8 = 0xFF;

/// Error type for frame construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload does not fit in [`PAYLOAD_CAPACITY`] bytes.
    PayloadTooLong,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PayloadTooLong => write!(f, "payload too long"),
        }
    }
}

/// Logical receive channel. Each channel has its own landing buffer on the
/// receive side, and a frame is only ever handled as part of the channel it
/// arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// USB HID relay traffic.
    Usb,
    /// Bluetooth HID relay traffic.
    Ble,
    /// Everything else: commands, queries, events.
    Control,
}

impl Channel {
    /// All channels, in index order.
    pub const ALL: [Channel; 3] = [Channel::Usb, Channel::Ble, Channel::Control];

    /// Classify a message type. Every value maps to exactly one channel.
    #[inline]
    #[must_use]
    pub const fn of(message_type: MessageType) -> Self {
        match message_type {
            MessageType::USB => Channel::Usb,
            MessageType::BLE => Channel::Ble,
            _ => Channel::Control,
        }
    }

    /// Stable index in `0..3`, for per-channel state arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Channel::Usb => 0,
            Channel::Ble => 1,
            Channel::Control => 2,
        }
    }
}

/// One link frame: a header followed by a fixed-size payload area.
///
/// The frame is stored as raw wire bytes. Field accessors decode the
/// little-endian header on demand, and [`Frame::message()`] gives a typed
/// view over the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_SIZE],
}

impl Frame {
    /// An all-zero frame.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            bytes: [0; FRAME_SIZE],
        }
    }

    /// The recovery-reboot marker frame (every byte is [`RECOVERY_SENTINEL`]).
    #[must_use]
    pub const fn recovery_marker() -> Self {
        Self {
            bytes: [RECOVERY_SENTINEL; FRAME_SIZE],
        }
    }

    /// Wrap raw wire bytes. Never fails: interpretation happens later.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; FRAME_SIZE]) -> Self {
        Self { bytes }
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.bytes
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; FRAME_SIZE] {
        &mut self.bytes
    }

    /// Zero every byte.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Discriminant selecting the payload layout.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        MessageType(u16::from_le_bytes([self.bytes[0], self.bytes[1]]))
    }

    /// Declared number of meaningful payload bytes (`payload_length1`).
    ///
    /// This is the raw header value and may exceed [`PAYLOAD_CAPACITY`].
    #[inline]
    #[must_use]
    pub fn payload_len(&self) -> u16 {
        u16::from_le_bytes([self.bytes[2], self.bytes[3]])
    }

    /// Channel this frame's message type belongs to.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> Channel {
        Channel::of(self.message_type())
    }

    /// Write the header fields.
    #[inline]
    pub fn set_header(&mut self, message_type: MessageType, payload_len: u16) {
        self.set_message_type(message_type);
        self.set_payload_len(payload_len);
    }

    #[inline]
    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.bytes[0..2].copy_from_slice(&message_type.to_le_bytes());
    }

    #[inline]
    pub fn set_payload_len(&mut self, payload_len: u16) {
        self.bytes[2..4].copy_from_slice(&payload_len.to_le_bytes());
    }

    /// Meaningful payload bytes: the first `payload_length1` bytes of the
    /// payload area, clamped to [`PAYLOAD_CAPACITY`].
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let len = usize::from(self.payload_len()).min(PAYLOAD_CAPACITY);
        &self.bytes[HEADER_SIZE..HEADER_SIZE + len]
    }

    /// The whole payload area, padding included.
    #[inline]
    #[must_use]
    pub fn payload_area(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    #[inline]
    pub fn payload_area_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[HEADER_SIZE..]
    }

    /// Copy `data` to the start of the payload area and set `payload_length1`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLong`] if `data` exceeds [`PAYLOAD_CAPACITY`].
    pub fn set_payload(&mut self, data: &[u8]) -> Result<(), FrameError> {
        if data.len() > PAYLOAD_CAPACITY {
            return Err(FrameError::PayloadTooLong);
        }
        self.bytes[HEADER_SIZE..HEADER_SIZE + data.len()].copy_from_slice(data);
        self.set_payload_len(data.len() as u16);
        Ok(())
    }

    /// Whether this is the recovery-reboot marker.
    ///
    /// The whole frame is scanned: header fields are not trusted, since an
    /// all-sentinel header alone is not proof of a marker.
    #[must_use]
    pub fn is_recovery_marker(&self) -> bool {
        self.bytes.iter().all(|&b| b == RECOVERY_SENTINEL)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("message_type", &self.message_type())
            .field("payload_len", &self.payload_len())
            .field("payload", &self.payload())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Frame {{ type: {=u16:#x}, len: {=u16} }}",
            self.message_type().raw(),
            self.payload_len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_little_endian() {
        let mut frame = Frame::zeroed();
        frame.set_header(MessageType(0x1234), 0x0102);
        assert_eq!(&frame.as_bytes()[..4], &[0x34, 0x12, 0x02, 0x01]);
        assert_eq!(frame.message_type(), MessageType(0x1234));
        assert_eq!(frame.payload_len(), 0x0102);
    }

    #[test]
    fn test_payload_clamped_to_capacity() {
        let mut frame = Frame::zeroed();
        frame.set_payload_len(u16::MAX);
        assert_eq!(frame.payload().len(), PAYLOAD_CAPACITY);
        frame.set_payload_len(3);
        assert_eq!(frame.payload().len(), 3);
    }

    #[test]
    fn test_set_payload_too_long() {
        let mut frame = Frame::zeroed();
        let data = [0u8; PAYLOAD_CAPACITY + 1];
        assert_eq!(frame.set_payload(&data), Err(FrameError::PayloadTooLong));
        assert!(frame.set_payload(&data[..PAYLOAD_CAPACITY]).is_ok());
        assert_eq!(usize::from(frame.payload_len()), PAYLOAD_CAPACITY);
    }

    #[test]
    fn test_recovery_marker_detection() {
        assert!(Frame::recovery_marker().is_recovery_marker());
        assert!(!Frame::zeroed().is_recovery_marker());
    }

    #[test]
    fn test_recovery_marker_needs_every_byte() {
        // Header alone looks like a marker, but the tail does not
        let mut frame = Frame::recovery_marker();
        frame.as_bytes_mut()[FRAME_SIZE - 1] = 0xFE;
        assert!(!frame.is_recovery_marker());

        // Any single non-sentinel byte breaks it, including in the header
        let mut frame = Frame::recovery_marker();
        frame.as_bytes_mut()[0] = 0x00;
        assert!(!frame.is_recovery_marker());
    }

    #[test]
    fn test_channel_partition() {
        assert_eq!(Channel::of(MessageType::USB), Channel::Usb);
        assert_eq!(Channel::of(MessageType::BLE), Channel::Ble);
        assert_eq!(Channel::of(MessageType::MAIN_MCU_COMMAND), Channel::Control);
        assert_eq!(Channel::of(MessageType(0xFFFF)), Channel::Control);
        for (i, ch) in Channel::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
    }
}
