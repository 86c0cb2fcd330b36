//! Outbound payload encoders.
//!
//! Each payload type implements [`Encode`], which writes the little-endian
//! payload into a frame and fills in the header.
//!
//! # Example
//!
//! ```
//! use auxlink_proto::{Encode, Event, EventId, Frame, Message};
//!
//! let mut frame = Frame::zeroed();
//! Event::new(EventId::IM_HERE).encode(&mut frame);
//!
//! assert_eq!(frame.payload_len(), 2);
//! assert!(matches!(frame.message(), Message::Event { id: EventId::IM_HERE, .. }));
//! ```

use crate::frame::{Frame, PAYLOAD_CAPACITY};
use crate::ids::{BleCommandId, EventId, MessageType};

/// Size of an encoded [`PlatformDetails`] payload.
pub const PLATFORM_DETAILS_SIZE: usize = 48;

/// Size of an encoded [`ChargeStatus`] payload.
pub const CHARGE_STATUS_SIZE: usize = 10;

/// Size of a stored bonding record.
pub const BONDING_INFO_SIZE: usize = 192;

/// Sequential little-endian writer over a payload area.
struct PayloadWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PayloadWriter<'a> {
    #[inline]
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    #[inline]
    fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline]
    fn put_i16(&mut self, value: i16) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline]
    fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline]
    fn finish(self) -> usize {
        self.pos
    }
}

/// Payload that knows its message type and wire layout.
pub trait Encode {
    /// Message type written into the header.
    const MESSAGE_TYPE: MessageType;

    /// Write the payload into `payload` (the frame's payload area) and
    /// return the number of meaningful bytes.
    fn write_payload(&self, payload: &mut [u8]) -> usize;

    /// Encode into `frame`, setting `message_type` and `payload_length1`.
    ///
    /// Bytes after the payload are left untouched; callers reusing a frame
    /// should [`Frame::clear()`] it first.
    fn encode(&self, frame: &mut Frame) {
        let len = self.write_payload(frame.payload_area_mut());
        frame.set_header(Self::MESSAGE_TYPE, len as u16);
    }
}

/// Aux event sent to the main controller: `event_id` plus optional bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    pub id: EventId,
    pub payload: &'a [u8],
}

impl Event<'static> {
    /// Event without payload.
    #[must_use]
    pub const fn new(id: EventId) -> Self {
        Self { id, payload: &[] }
    }
}

impl<'a> Event<'a> {
    #[must_use]
    pub const fn with_payload(id: EventId, payload: &'a [u8]) -> Self {
        Self { id, payload }
    }
}

impl Encode for Event<'_> {
    const MESSAGE_TYPE: MessageType = MessageType::AUX_MCU_EVENT;

    fn write_payload(&self, payload: &mut [u8]) -> usize {
        let n = self.payload.len().min(PAYLOAD_CAPACITY - 2);
        let mut w = PayloadWriter::new(payload);
        w.put_u16(self.id.raw());
        w.put_bytes(&self.payload[..n]);
        w.finish()
    }
}

/// BLE command sent to the main controller (bonding store / recall).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BleRequest<'a> {
    pub id: BleCommandId,
    pub payload: &'a [u8],
}

impl Encode for BleRequest<'_> {
    const MESSAGE_TYPE: MessageType = MessageType::BLE_COMMAND;

    fn write_payload(&self, payload: &mut [u8]) -> usize {
        let n = self.payload.len().min(PAYLOAD_CAPACITY - 2);
        let mut w = PayloadWriter::new(payload);
        w.put_u16(self.id.raw());
        w.put_bytes(&self.payload[..n]);
        w.finish()
    }
}

/// Request for a block of random bytes. The peer ignores the payload, but
/// an empty payload is not a valid request, so one zero byte is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RngRequest;

impl Encode for RngRequest {
    const MESSAGE_TYPE: MessageType = MessageType::RNG_TRANSFER;

    fn write_payload(&self, payload: &mut [u8]) -> usize {
        payload[0] = 0;
        1
    }
}

/// Outcome of a keyboard-type request, sent back under the request's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TypingResult {
    pub success: bool,
}

impl Encode for TypingResult {
    const MESSAGE_TYPE: MessageType = MessageType::KEYBOARD_TYPE;

    fn write_payload(&self, payload: &mut [u8]) -> usize {
        let mut w = PayloadWriter::new(payload);
        w.put_u16(u16::from(self.success));
        w.finish()
    }
}

/// Radio stack details, present only while the radio is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioDetails {
    pub lib_major: u16,
    pub lib_minor: u16,
    pub fw_major: u16,
    pub fw_minor: u16,
    pub fw_build: u16,
    pub rf_version: u32,
    pub chip_id: u32,
    pub address: [u8; 6],
}

/// Reply to a platform-details query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlatformDetails {
    pub fw_major: u16,
    pub fw_minor: u16,
    /// Device identification register.
    pub device_id: u32,
    /// Factory-programmed unique id words.
    pub unique_id: [u32; 4],
    /// Zeroed when the radio is disabled.
    pub radio: RadioDetails,
}

impl Encode for PlatformDetails {
    const MESSAGE_TYPE: MessageType = MessageType::PLATFORM_DETAILS;

    fn write_payload(&self, payload: &mut [u8]) -> usize {
        let mut w = PayloadWriter::new(payload);
        w.put_u16(self.fw_major);
        w.put_u16(self.fw_minor);
        w.put_u32(self.device_id);
        for word in self.unique_id {
            w.put_u32(word);
        }
        w.put_u16(self.radio.lib_major);
        w.put_u16(self.radio.lib_minor);
        w.put_u16(self.radio.fw_major);
        w.put_u16(self.radio.fw_minor);
        w.put_u16(self.radio.fw_build);
        w.put_u32(self.radio.rf_version);
        w.put_u32(self.radio.chip_id);
        w.put_bytes(&self.radio.address);
        w.finish()
    }
}

/// Reply to a charge-status query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChargeStatus {
    /// Charging state machine value, as reported by the battery logic.
    pub status: u16,
    pub battery_mv: u16,
    /// Charge current in ADC differential units.
    pub charge_current: i16,
    pub stepdown_mv: u16,
    /// Raw DAC data register driving the step-down regulator.
    pub dac_register: u16,
}

impl Encode for ChargeStatus {
    const MESSAGE_TYPE: MessageType = MessageType::NIMH_CHARGE;

    fn write_payload(&self, payload: &mut [u8]) -> usize {
        let mut w = PayloadWriter::new(payload);
        w.put_u16(self.status);
        w.put_u16(self.battery_mv);
        w.put_i16(self.charge_current);
        w.put_u16(self.stepdown_mv);
        w.put_u16(self.dac_register);
        w.finish()
    }
}

/// Bonding record stored on the main controller for one BLE peer.
///
/// The record is opaque to the link apart from its leading address fields.
#[derive(Clone, PartialEq, Eq)]
pub struct BondingInfo {
    bytes: [u8; BONDING_INFO_SIZE],
}

impl BondingInfo {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; BONDING_INFO_SIZE]) -> Self {
        Self { bytes }
    }

    /// Copy a record out of a payload slice. Returns `None` unless the slice
    /// holds at least [`BONDING_INFO_SIZE`] bytes.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let src = data.get(..BONDING_INFO_SIZE)?;
        let mut bytes = [0u8; BONDING_INFO_SIZE];
        bytes.copy_from_slice(src);
        Some(Self { bytes })
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; BONDING_INFO_SIZE] {
        &self.bytes
    }

    #[inline]
    #[must_use]
    pub fn address_resolv_type(&self) -> u16 {
        u16::from_le_bytes([self.bytes[2], self.bytes[3]])
    }

    #[inline]
    #[must_use]
    pub fn mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.bytes[4..10]);
        mac
    }
}

impl core::fmt::Debug for BondingInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Key material is deliberately not printed
        f.debug_struct("BondingInfo")
            .field("address_resolv_type", &self.address_resolv_type())
            .field("mac", &self.mac())
            .finish_non_exhaustive()
    }
}
