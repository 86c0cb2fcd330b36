//! Platform-agnostic message engine for the aux controller side of the
//! main/aux controller link.
//!
//! This crate provides the logic between the serial link and the device:
//!
//! - [`LinkEngine`] - drains received frames and dispatches each one exactly
//!   once, acting early on frames whose meaningful bytes have already arrived
//! - Control commands: sleep handshake, USB attach/detach, charging, radio
//!   lifecycle, keyboard typing, [`selftest`], recovery reboot
//! - Request helpers: [`LinkEngine::fetch_random_bytes()`],
//!   [`LinkEngine::recall_bonding_info()`], [`LinkEngine::store_bonding_info()`]
//! - Collaborator traits in [`ports`], implemented by the firmware for real
//!   hardware and by mocks in tests
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   frames   ┌────────────┐   relay    ┌──────────┐
//! │ Transport │ ─────────▶ │ LinkEngine │ ─────────▶ │ HidPort  │
//! │  (UART)   │ ◀───────── │            │ ─────────▶ │ Radio,   │
//! └───────────┘  replies   └────────────┘  commands  │ Battery… │
//!                                                    └──────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut engine = LinkEngine::new(transport, device);
//! engine.start();
//! loop {
//!     engine.poll().await;
//!     if engine.take_full_sleep_request() {
//!         sleep_until_woken().await;
//!         engine.resume_link();
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Log through defmt and derive `defmt::Format` on public types

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod fmt;

pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod interpreter;
pub mod ports;
mod request;
pub mod selftest;

#[cfg(test)]
mod testing;

pub use config::{LinkConfig, SelfTestConfig, DEFAULT_CONFIG, DEFAULT_SELF_TEST};
pub use engine::{LinkEngine, PollResult};
pub use error::{KeyboardError, LinkError, RecallError, SelfTestFailure};
pub use flags::ReceiveFlags;
pub use interpreter::{decode_symbol, Keystrokes, UNTYPEABLE_SYMBOL};
pub use ports::{
    Battery, ChargePath, CurrentSense, Device, HidInterface, HidPort, Keyboard, Radio, System,
    Transport, TxTest,
};

// Re-export the protocol crate so users need a single dependency
pub use auxlink_proto;
pub use auxlink_proto::{BondingInfo, Channel, EventId, Frame, MessageType};
