//! Aux controller link firmware for RP2040.
//!
//! This crate binds the platform-agnostic [`auxlink_core::LinkEngine`] to an
//! RP2040 board acting as the auxiliary controller of a two-chip device:
//! it talks to the main controller over UART, presents USB HID interfaces
//! to the host, and drives the battery charge path.
//!
//! # Hardware Configuration
//!
//! | Function          | GPIO | Description |
//! |-------------------|------|-------------|
//! | UART1 TX          | 8    | Link to main controller |
//! | UART1 RX          | 9    | Link from main controller |
//! | WAKE_IN           | 10   | Main controller wakes us (active low) |
//! | WAKE_OUT          | 11   | Pulse to wake the main controller |
//! | PEER_AWAKE        | 12   | Main controller awake (high) |
//! | STEPDOWN_EN       | 14   | Step-down regulator enable |
//! | CHARGE_EN         | 15   | Charge path switch |
//! | STEPDOWN_PWM      | 16   | Step-down voltage setpoint (filtered PWM) |
//! | SENSE_HIGH (ADC0) | 26   | Regulator side of the sense resistor |
//! | SENSE_LOW (ADC1)  | 27   | Battery side of the sense resistor |
//! | LED               | 25   | On-board LED (on while awake) |
//!
//! # Architecture
//!
//! - **Receive task** (interrupt executor): assembles frames from UART bytes
//!   and lands them per channel, see [`transport`]
//! - **USB task**: runs the USB stack, attached and detached on request of
//!   the main controller, see [`usb`]
//! - **Link task** (thread executor): polls the engine, handles full sleep
//!
//! The board collaborators the engine calls into live in [`board`] and
//! [`charger`].
//!
//! # Features
//!
//! - **`dev-panic`** (default): Use `panic-probe` for development (prints panic info via RTT)
//! - **`prod-panic`**: Use `panic-reset` for production (silent watchdog reset)

#![no_std]

pub mod board;
pub mod charger;
pub mod transport;
pub mod usb;

pub use board::{take_bootloader_request, Board, BoardPins};
pub use charger::Charger;
pub use transport::{receive_loop, UartTransport, LINK_BAUDRATE};
pub use usb::{configure_usb_hid, usb_loop, DeviceStatusHandler, UsbHandler, UsbHid};

// Re-export the engine so the binary only needs this crate
pub use auxlink_core::{LinkConfig, LinkEngine, System, DEFAULT_CONFIG};
