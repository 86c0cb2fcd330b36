//! Board collaborators for the link engine.
//!
//! [`Board`] implements every device trait the engine drives. This board
//! carries no radio: the radio services answer as a stack that never came
//! up, which the main controller sees as a zero SDK version.

use auxlink_core::auxlink_proto::{ChargeStatus, RadioDetails};
use auxlink_core::{
    Battery, ChargePath, CurrentSense, HidInterface, HidPort, Keyboard, KeyboardError, Radio,
    System, TxTest,
};
use cortex_m::peripheral::SCB;
use defmt::{debug, info, warn};
use embassy_rp::gpio::{Input, Output};
use embassy_rp::watchdog::Watchdog;
use embassy_time::{block_for, Duration, Instant, Timer};

use crate::charger::Charger;
use crate::usb::{self, UsbHid};

/// Aux firmware version reported in platform details.
pub const FW_VERSION: (u16, u16) = (0, 1);

/// Watchdog scratch register holding the bootloader request.
const BOOTLOADER_SCRATCH: usize = 0;
const BOOTLOADER_MAGIC: u32 = 0xB007_10AD;

/// Width of the pulse on the main controller's wake line.
const WAKE_PULSE: Duration = Duration::from_micros(20);

/// Consume a bootloader request persisted before the last reset.
pub fn take_bootloader_request(watchdog: &mut Watchdog) -> bool {
    let requested = watchdog.get_scratch(BOOTLOADER_SCRATCH) == BOOTLOADER_MAGIC;
    watchdog.set_scratch(BOOTLOADER_SCRATCH, 0);
    requested
}

/// Wake handshake lines and the awake LED.
pub struct BoardPins {
    /// Pulled low by the main controller to wake us.
    pub wake_in: Input<'static>,
    /// Pulsed to wake the main controller.
    pub wake_out: Output<'static>,
    /// High while the main controller is awake.
    pub peer_awake: Input<'static>,
    pub led: Output<'static>,
}

pub struct Board {
    usb: UsbHid,
    charger: Charger,
    pins: BoardPins,
    watchdog: Watchdog,
    device_id: u32,
    unique_id: [u32; 4],
}

impl Board {
    /// `flash_uid` is the 64-bit unique id of the boot flash.
    #[must_use]
    pub fn new(
        usb: UsbHid,
        charger: Charger,
        pins: BoardPins,
        watchdog: Watchdog,
        flash_uid: [u8; 8],
    ) -> Self {
        let device_id = embassy_rp::pac::SYSINFO.chip_id().read().0;
        let mut unique_id = [0u32; 4];
        for (word, bytes) in unique_id.iter_mut().zip(flash_uid.chunks_exact(4)) {
            *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Self {
            usb,
            charger,
            pins,
            watchdog,
            device_id,
            unique_id,
        }
    }
}

impl HidPort for Board {
    async fn relay(&mut self, interface: HidInterface, payload: &[u8]) {
        match interface {
            HidInterface::Usb => self.usb.relay(payload).await,
            HidInterface::Ble => debug!("BLE relay dropped, no radio"),
        }
    }

    fn usb_attach(&mut self) {
        usb::request_attach(true);
    }

    fn usb_detach(&mut self) {
        usb::request_attach(false);
    }

    fn clear_usb_enumerated(&mut self) {
        usb::clear_configured();
    }

    fn update_device_status(&mut self, status: &[u8]) {
        usb::set_device_status(status);
    }
}

impl Radio for Board {
    fn radio_start(&mut self, address: &[u8; 6]) {
        info!("radio start requested for {:02x}, no radio fitted", address);
    }

    fn radio_stop(&mut self) {}

    fn radio_sdk_version(&self) -> u32 {
        0
    }

    fn radio_details(&mut self) -> RadioDetails {
        RadioDetails::default()
    }

    fn set_battery_level(&mut self, percent: u8) {
        debug!("battery level {}%, no battery service", percent);
    }

    fn tx_test(&mut self, test: TxTest, continuous: bool) {
        warn!("tx test {:?} (continuous: {}) unsupported", test, continuous);
    }

    fn tx_stop_tone(&mut self) {}
}

impl Battery for Board {
    fn charge_status(&mut self) -> ChargeStatus {
        self.charger.charge_status()
    }

    fn start_using_adc(&mut self) {
        self.charger.start_using_adc();
    }

    fn stop_using_adc(&mut self) {
        self.charger.stop_using_adc();
    }

    fn start_nimh_charge(&mut self) {
        self.charger.start_nimh_charge();
    }

    fn stop_charge(&mut self) {
        self.charger.stop_charge();
    }

    fn force_charge_voltage(&mut self, mv: u16) {
        self.charger.force_charge_voltage(mv);
    }

    fn stop_forced_charge(&mut self) {
        self.charger.stop_forced_charge();
    }
}

impl ChargePath for Board {
    fn enable_step_down(&mut self, mv: u16) {
        self.charger.enable_step_down(mv);
    }

    fn set_step_down_voltage(&mut self, mv: u16) {
        self.charger.set_step_down_voltage(mv);
    }

    fn disable_step_down(&mut self) {
        self.charger.disable_step_down();
    }

    fn enable_charge_path(&mut self) {
        self.charger.enable_charge_path();
    }

    fn disable_charge_path(&mut self) {
        self.charger.disable_charge_path();
    }

    fn restart_current_sense(&mut self) {
        self.charger.restart_current_sense();
    }

    async fn sample_current_sense(&mut self) -> CurrentSense {
        self.charger.sample_current_sense().await
    }
}

impl Keyboard for Board {
    async fn type_key(
        &mut self,
        interface: HidInterface,
        key: u8,
        dead_key: bool,
        delay_ms: u16,
    ) -> Result<(), KeyboardError> {
        match interface {
            HidInterface::Usb => self.usb.type_key(key, dead_key, delay_ms).await,
            HidInterface::Ble => Err(KeyboardError::NotReady),
        }
    }
}

impl System for Board {
    fn firmware_version(&self) -> (u16, u16) {
        FW_VERSION
    }

    fn device_id(&self) -> u32 {
        self.device_id
    }

    fn unique_id(&self) -> [u32; 4] {
        self.unique_id
    }

    fn reset(&mut self) {
        cortex_m::interrupt::disable();
        SCB::sys_reset();
    }

    fn set_bootloader_flag(&mut self) {
        self.watchdog.set_scratch(BOOTLOADER_SCRATCH, BOOTLOADER_MAGIC);
    }

    async fn enter_standby(&mut self) {
        self.pins.led.set_low();
        self.pins.wake_in.wait_for_low().await;
        self.pins.led.set_high();
        debug!("woken by main controller");
    }

    fn wake_peer_if_needed(&mut self) {
        if self.pins.peer_awake.is_low() {
            self.pins.wake_out.set_high();
            block_for(WAKE_PULSE);
            self.pins.wake_out.set_low();
        }
    }

    fn set_no_comms_unavailable(&mut self) {
        // Nothing on this board depends on the no-comms line
        info!("main controller reports no-comms line unavailable");
    }

    async fn delay_ms(&mut self, ms: u32) {
        Timer::after_millis(u64::from(ms)).await;
    }

    fn uptime_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}
