//! Typed views over a frame's payload.
//!
//! [`Frame::message()`] validates the `message_type` discriminant once and
//! returns a [`Message`] borrowing the frame bytes. Fixed-position fields are
//! read from the payload area like a C union; variable-length tails are
//! bounded by `payload_length1`, so handlers never see padding as data.

use crate::frame::Frame;
use crate::ids::{BleCommandId, BootloaderCommand, EventId, MainCommandId, MessageType};

/// Decoded view of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Message<'a> {
    /// Opaque USB HID relay bytes.
    UsbRelay(&'a [u8]),
    /// Opaque BLE HID relay bytes.
    BleRelay(&'a [u8]),
    /// Bootloader command.
    Bootloader(BootloaderCommand),
    /// Request for the platform details report.
    PlatformDetailsQuery,
    /// Main-controller command with sub-id.
    MainCommand(MainCommand<'a>),
    /// Aux event (normally only travels aux -> main).
    Event {
        id: EventId,
        payload: &'a [u8],
    },
    /// Request for the battery charge status.
    ChargeStatusQuery,
    /// Keep-alive asking the aux controller to announce itself.
    PingWithInfo,
    /// Sequence of symbols to type through keyboard emulation.
    KeyboardType(KeyboardType<'a>),
    /// FIDO2 relay bytes (handled by the main controller, not here).
    Fido2(&'a [u8]),
    /// BLE lifecycle / bonding command.
    BleCommand(BleCommand<'a>),
    /// Random bytes block (reply to an RNG request).
    RngTransfer(&'a [u8]),
    /// Anything else.
    Unknown(MessageType),
}

/// Main-controller command: `command: u16` followed by arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainCommand<'a> {
    pub command: MainCommandId,
    /// Argument bytes (bounded by the declared payload length).
    pub args: &'a [u8],
}

impl MainCommand<'_> {
    /// Argument byte at `index`, or 0 if not present.
    #[inline]
    #[must_use]
    pub fn arg_u8(&self, index: usize) -> u8 {
        self.args.get(index).copied().unwrap_or(0)
    }

    /// Little-endian u16 argument at word `index`, or 0 if not present.
    #[inline]
    #[must_use]
    pub fn arg_u16(&self, index: usize) -> u16 {
        read_u16(self.args, index * 2)
    }
}

/// BLE command: `message_id: u16` followed by its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BleCommand<'a> {
    pub id: BleCommandId,
    pub payload: &'a [u8],
}

impl BleCommand<'_> {
    /// First six payload bytes as a device address, zero padded.
    #[must_use]
    pub fn address(&self) -> [u8; 6] {
        let mut addr = [0u8; 6];
        let n = self.payload.len().min(addr.len());
        addr[..n].copy_from_slice(&self.payload[..n]);
        addr
    }
}

/// Keyboard typing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardType<'a> {
    /// Which HID interface to type on (USB or BLE).
    pub interface: u16,
    /// Delay between two key presses, in milliseconds.
    pub delay_ms: u16,
    symbols: &'a [u8],
}

impl<'a> KeyboardType<'a> {
    /// Iterate symbols up to (excluding) the zero terminator or the end of
    /// the declared payload, whichever comes first.
    pub fn symbols(&self) -> SymbolIter<'a> {
        SymbolIter {
            bytes: self.symbols,
            pos: 0,
        }
    }
}

/// Iterator over the 16-bit symbol codes of a [`KeyboardType`] request.
#[derive(Debug, Clone)]
pub struct SymbolIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Iterator for SymbolIter<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        if self.pos + 2 > self.bytes.len() {
            return None;
        }
        let symbol = read_u16(self.bytes, self.pos);
        if symbol == 0 {
            // Stay terminated
            self.pos = self.bytes.len();
            return None;
        }
        self.pos += 2;
        Some(symbol)
    }
}

impl Frame {
    /// Decode the typed view of this frame. Never fails.
    pub fn message(&self) -> Message<'_> {
        let payload = self.payload();
        let area = self.payload_area();
        // Everything after the leading u16 sub-id, bounded by the declared length
        let tail = payload.get(2..).unwrap_or(&[]);

        match self.message_type() {
            MessageType::USB => Message::UsbRelay(payload),
            MessageType::BLE => Message::BleRelay(payload),
            MessageType::BOOTLOADER => {
                Message::Bootloader(BootloaderCommand::from_le_slice(area))
            }
            MessageType::PLATFORM_DETAILS => Message::PlatformDetailsQuery,
            MessageType::MAIN_MCU_COMMAND => Message::MainCommand(MainCommand {
                command: MainCommandId::from_le_slice(area),
                args: tail,
            }),
            MessageType::AUX_MCU_EVENT => Message::Event {
                id: EventId::from_le_slice(area),
                payload: tail,
            },
            MessageType::NIMH_CHARGE => Message::ChargeStatusQuery,
            MessageType::PING_WITH_INFO => Message::PingWithInfo,
            MessageType::KEYBOARD_TYPE => Message::KeyboardType(KeyboardType {
                interface: read_u16(area, 0),
                delay_ms: read_u16(area, 2),
                symbols: payload.get(4..).unwrap_or(&[]),
            }),
            MessageType::FIDO2 => Message::Fido2(payload),
            MessageType::BLE_COMMAND => Message::BleCommand(BleCommand {
                id: BleCommandId::from_le_slice(area),
                payload: tail,
            }),
            MessageType::RNG_TRANSFER => Message::RngTransfer(payload),
            other => Message::Unknown(other),
        }
    }
}

#[inline]
fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    match bytes.get(offset..offset + 2) {
        Some(b) => u16::from_le_bytes([b[0], b[1]]),
        None => 0,
    }
}
