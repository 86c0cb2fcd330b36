//! Collaborator traits the engine drives.
//!
//! ```text
//!   Transport ──▶ LinkEngine ──▶ HidPort / Radio / Battery / ChargePath
//!                     │                    Keyboard / System
//!                     └──────────────▶ Transport (replies, events)
//! ```
//!
//! The engine is generic over these traits, so the whole message path runs
//! on the host against mocks and on the board against real drivers.
//! Methods that wait on hardware return futures; everything else is a
//! plain call.

use core::future::Future;

use auxlink_proto::{Channel, ChargeStatus, Frame, RadioDetails};

use crate::error::KeyboardError;

/// HID interface a relay frame or a typed key goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidInterface {
    Usb,
    Ble,
}

impl HidInterface {
    /// Map the interface id used in keyboard-type requests.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(HidInterface::Usb),
            1 => Some(HidInterface::Ble),
            _ => None,
        }
    }
}

/// Serial link to the main controller.
///
/// Receive side: the transport lands each complete frame in the buffer of
/// the channel its `message_type` belongs to, then raises that channel's
/// fully-received flag from its completion context. While a frame is still
/// arriving, its prefix can be read from the in-flight buffer.
///
/// Send side: a single transmission at a time.
pub trait Transport {
    /// Arm reception. Frames landing before this call are lost.
    fn start_receive(&mut self);

    /// Disarm reception (link going down for sleep).
    fn stop_receive(&mut self);

    /// Start transmitting `frame`, first waiting for any previous
    /// transmission to finish. May return before this one completes.
    fn send(&mut self, frame: &Frame) -> impl Future<Output = ()>;

    /// Wait until no transmission is in progress.
    fn wait_send_complete(&mut self) -> impl Future<Output = ()>;

    /// Bytes still to arrive for the frame currently being received
    /// ([`FRAME_SIZE`](auxlink_proto::FRAME_SIZE) when nothing has arrived).
    fn remaining_bytes(&self) -> u16;

    fn is_fully_received(&self, channel: Channel) -> bool;

    fn clear_fully_received(&self, channel: Channel);

    /// Copy the last complete frame of `channel` into `frame`.
    fn read_received(&self, channel: Channel, frame: &mut Frame);

    /// Copy the first `dst.len()` bytes of the frame currently being
    /// received into `dst`.
    ///
    /// Only meaningful inside a critical section, where the completion
    /// context cannot move the receive forward.
    fn read_in_flight(&self, dst: &mut [u8]);
}

/// HID side of the device: relay traffic and USB connection control.
pub trait HidPort {
    /// Forward an opaque relay payload to the host through `interface`.
    fn relay(&mut self, interface: HidInterface, payload: &[u8]) -> impl Future<Output = ()>;

    /// Connect the USB pull-ups.
    fn usb_attach(&mut self);

    /// Disconnect the USB pull-ups.
    fn usb_detach(&mut self);

    /// Forget that the host enumerated us.
    fn clear_usb_enumerated(&mut self);

    /// Replace the cached device status served to the host.
    fn update_device_status(&mut self, status: &[u8]);
}

/// Radio test-mode parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxTest {
    pub frequency_index_start: u16,
    pub frequency_index_end: u16,
    pub packet_length: u16,
}

/// Radio stack lifecycle and services.
pub trait Radio {
    /// Bring the radio stack up with the given device address.
    fn radio_start(&mut self, address: &[u8; 6]);

    fn radio_stop(&mut self);

    /// Stack version reported after start, 0 if the stack is not running.
    fn radio_sdk_version(&self) -> u32;

    /// Version and identity details, zeroed where unavailable.
    fn radio_details(&mut self) -> RadioDetails;

    /// Battery percentage for the battery service.
    fn set_battery_level(&mut self, percent: u8);

    /// Sweep (or continuous tone) test. The radio reports completion to the
    /// main controller itself.
    fn tx_test(&mut self, test: TxTest, continuous: bool);

    fn tx_stop_tone(&mut self);
}

/// Battery charging logic.
pub trait Battery {
    fn charge_status(&mut self) -> ChargeStatus;

    /// Start the ADC conversions the charger will need.
    fn start_using_adc(&mut self);

    fn stop_using_adc(&mut self);

    fn start_nimh_charge(&mut self);

    fn stop_charge(&mut self);

    /// Debug override: hold the charge voltage at `mv`.
    fn force_charge_voltage(&mut self, mv: u16);

    fn stop_forced_charge(&mut self);
}

/// One current-sense conversion, in ADC units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentSense {
    /// Voltage on the supply side of the sense resistor.
    pub high: i16,
    /// Voltage on the battery side of the sense resistor.
    pub low: i16,
}

impl CurrentSense {
    /// Voltage drop across the sense resistor, proportional to current.
    #[inline]
    #[must_use]
    pub fn differential(&self) -> i32 {
        i32::from(self.high) - i32::from(self.low)
    }
}

/// Raw charge-path hardware: step-down regulator, charge switches and the
/// current-sense ADC.
pub trait ChargePath {
    fn enable_step_down(&mut self, mv: u16);

    fn set_step_down_voltage(&mut self, mv: u16);

    fn disable_step_down(&mut self);

    /// Close the switches between regulator and battery.
    fn enable_charge_path(&mut self);

    fn disable_charge_path(&mut self);

    /// Throw away the conversion in progress and start a new one.
    fn restart_current_sense(&mut self);

    /// Wait for the conversion in progress, return it and start the next.
    fn sample_current_sense(&mut self) -> impl Future<Output = CurrentSense>;
}

/// Keyboard emulation.
pub trait Keyboard {
    /// Press and release one physical key, then wait `delay_ms`.
    fn type_key(
        &mut self,
        interface: HidInterface,
        key: u8,
        dead_key: bool,
        delay_ms: u16,
    ) -> impl Future<Output = Result<(), KeyboardError>>;
}

/// Chip-level services.
pub trait System {
    /// Aux firmware version as (major, minor).
    fn firmware_version(&self) -> (u16, u16);

    /// Device identification register.
    fn device_id(&self) -> u32;

    fn unique_id(&self) -> [u32; 4];

    /// Hard reset with interrupts disabled. Does not return on hardware;
    /// test doubles record the call and return.
    fn reset(&mut self);

    /// Persist the "enter bootloader on next boot" request.
    fn set_bootloader_flag(&mut self);

    /// Low-power wait until the main controller wakes us.
    fn enter_standby(&mut self) -> impl Future<Output = ()>;

    /// Pulse the main controller's wake line if it is asleep.
    fn wake_peer_if_needed(&mut self);

    /// The main controller says its no-comms line is not usable.
    fn set_no_comms_unavailable(&mut self);

    fn delay_ms(&mut self, ms: u32) -> impl Future<Output = ()>;

    /// Monotonic milliseconds, used for bounded waits.
    fn uptime_ms(&self) -> u64;
}

/// Everything the engine needs from the device besides the transport.
pub trait Device: HidPort + Radio + Battery + ChargePath + Keyboard + System {}

impl<T> Device for T where T: HidPort + Radio + Battery + ChargePath + Keyboard + System {}
