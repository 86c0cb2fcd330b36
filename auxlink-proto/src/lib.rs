//! Frame layout and message types for the link between the main controller
//! and the auxiliary (USB / radio / charging) controller.
//!
//! This crate provides everything needed to read and build link frames:
//!
//! - **Frames**: [`Frame`] is the fixed-size unit exchanged over the serial link
//!   - [`FRAME_SIZE`], [`HEADER_SIZE`], [`PAYLOAD_CAPACITY`]
//!   - [`Channel`] - which receive buffer a message type belongs to
//!
//! - **Decoding**: [`Frame::message()`] yields a typed [`Message`] view over the
//!   frame bytes. Decoding never fails; unknown types become [`Message::Unknown`].
//!
//! - **Encoding**: payload structures implementing [`Encode`]
//!   - [`Event`], [`PlatformDetails`], [`ChargeStatus`], [`TypingResult`]
//!   - [`BleRequest`], [`RngRequest`], [`BondingInfo`]
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────────┬────────────────────┬──────────────────────────────┐
//! │ message_type u16 │ payload_length1 u16│ payload (540 B, LE fields)   │
//! └──────────────────┴────────────────────┴──────────────────────────────┘
//! ```
//!
//! Every frame is exactly [`FRAME_SIZE`] bytes on the wire. Only the first
//! `payload_length1` payload bytes are meaningful; the rest is padding.
//!
//! A frame made only of `0xFF` bytes is the recovery-reboot marker, see
//! [`Frame::is_recovery_marker()`].
//!
//! # Example
//!
//! ```
//! use auxlink_proto::{Frame, Message, MessageType, MainCommandId};
//!
//! let mut frame = Frame::zeroed();
//! frame.set_header(MessageType::MAIN_MCU_COMMAND, 2);
//! frame.payload_area_mut()[..2].copy_from_slice(&MainCommandId::SLEEP.to_le_bytes());
//!
//! match frame.message() {
//!     Message::MainCommand(cmd) => assert_eq!(cmd.command, MainCommandId::SLEEP),
//!     _ => unreachable!(),
//! }
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod encode;
pub mod frame;
pub mod ids;
pub mod message;

pub use encode::{
    BleRequest, BondingInfo, ChargeStatus, Encode, Event, PlatformDetails, RadioDetails,
    RngRequest, TypingResult, BONDING_INFO_SIZE, CHARGE_STATUS_SIZE, PLATFORM_DETAILS_SIZE,
};
pub use frame::{
    Channel, Frame, FrameError, FRAME_SIZE, HEADER_SIZE, PAYLOAD_CAPACITY, RECOVERY_SENTINEL,
};
pub use ids::{
    BleCommandId, BootloaderCommand, EventId, MainCommandId, MessageType, RNG_BLOCK_SIZE,
};
pub use message::{BleCommand, KeyboardType, MainCommand, Message, SymbolIter};
