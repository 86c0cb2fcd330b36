//! USB side of the board: a vendor HID interface relaying the main
//! controller's packets to the host, and a boot keyboard for typing.

use core::cell::RefCell;

use auxlink_core::KeyboardError;
use defmt::{debug, info, warn};
use embassy_futures::select::select;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use embassy_usb::class::hid::{HidWriter, ReportId, RequestHandler, State};
use embassy_usb::control::OutResponse;
use embassy_usb::{Builder, Handler, UsbDevice};
use heapless::Vec;
use portable_atomic::{AtomicBool, Ordering};
use usbd_hid::descriptor::{KeyboardReport, SerializedDescriptor};

type UsbDriver = Driver<'static, USB>;

/// Relay report size, one full-speed packet.
pub const RELAY_REPORT_SIZE: usize = 64;

/// Keyboard input report size: modifiers, reserved, six keycodes.
pub const KEYBOARD_REPORT_SIZE: usize = 8;

/// Bound on a single report write, so a host that stopped polling cannot
/// stall the link.
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Typed key byte layout: modifier flags in the two top bits.
const KEY_SHIFT: u8 = 0x80;
const KEY_ALTGR: u8 = 0x40;
const KEY_CODE_MASK: u8 = 0x3F;

const MOD_LEFT_SHIFT: u8 = 0x02;
const MOD_RIGHT_ALT: u8 = 0x40;
const KEYCODE_SPACE: u8 = 0x2C;

/// Vendor-defined relay interface: 64-byte input, output and feature
/// reports. The feature report serves the cached device status.
pub const RELAY_REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, // Usage (0x01)
    0xA1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x40, //   Report Count (64)
    //
    0x09, 0x02, //   Usage (0x02)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0x03, //   Usage (0x03)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x09, 0x04, //   Usage (0x04)
    0xB1, 0x02, //   Feature (Data, Variable, Absolute)
    //
    0xC0, // End Collection
];

/// Set by the USB stack once the host selected a configuration.
static USB_CONFIGURED: AtomicBool = AtomicBool::new(false);

/// Attach (true) / detach (false) requests for [`usb_loop`].
static USB_ATTACH: Signal<CriticalSectionRawMutex, bool> = Signal::new();

/// Device status served to the host through the relay feature report.
static DEVICE_STATUS: Mutex<CriticalSectionRawMutex, RefCell<Vec<u8, RELAY_REPORT_SIZE>>> =
    Mutex::new(RefCell::new(Vec::new()));

/// Run the USB stack while attached.
///
/// Starts detached; the main controller decides when the pull-ups go on.
pub async fn usb_loop(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    loop {
        while !USB_ATTACH.wait().await {}
        info!("USB attached");
        select(device.run(), async { while USB_ATTACH.wait().await {} }).await;
        device.disable().await;
        USB_CONFIGURED.store(false, Ordering::Release);
        info!("USB detached");
    }
}

pub(crate) fn request_attach(attached: bool) {
    USB_ATTACH.signal(attached);
}

pub(crate) fn clear_configured() {
    USB_CONFIGURED.store(false, Ordering::Release);
}

pub(crate) fn is_configured() -> bool {
    USB_CONFIGURED.load(Ordering::Acquire)
}

pub(crate) fn set_device_status(status: &[u8]) {
    DEVICE_STATUS.lock(|cached| {
        let mut cached = cached.borrow_mut();
        cached.clear();
        let len = status.len().min(RELAY_REPORT_SIZE);
        // Cannot fail: length bounded by capacity
        let _ = cached.extend_from_slice(&status[..len]);
    });
}

/// Tracks whether the host has configured the device.
pub struct UsbHandler;

impl Handler for UsbHandler {
    fn reset(&mut self) {
        USB_CONFIGURED.store(false, Ordering::Release);
    }

    fn configured(&mut self, configured: bool) {
        debug!("USB configured: {}", configured);
        USB_CONFIGURED.store(configured, Ordering::Release);
    }
}

/// Serves the cached device status as the relay feature report.
pub struct DeviceStatusHandler;

impl RequestHandler for DeviceStatusHandler {
    fn get_report(&mut self, _id: ReportId, buf: &mut [u8]) -> Option<usize> {
        DEVICE_STATUS.lock(|cached| {
            let cached = cached.borrow();
            let len = cached.len().min(buf.len());
            buf[..len].copy_from_slice(&cached[..len]);
            Some(len)
        })
    }

    fn set_report(&mut self, _id: ReportId, _data: &[u8]) -> OutResponse {
        OutResponse::Accepted
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, _duration_ms: u32) {}

    fn get_idle_ms(&mut self, _id: Option<ReportId>) -> Option<u32> {
        None
    }
}

/// Both HID interfaces, written from the link task.
pub struct UsbHid {
    relay: HidWriter<'static, UsbDriver, RELAY_REPORT_SIZE>,
    keyboard: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>,
}

impl UsbHid {
    /// Forward a relay payload to the host, one report per 64 bytes.
    ///
    /// Dropped when the host has not configured us.
    pub async fn relay(&mut self, payload: &[u8]) {
        if !is_configured() {
            debug!("relay dropped, USB not configured");
            return;
        }
        for chunk in payload.chunks(RELAY_REPORT_SIZE) {
            match with_timeout(WRITE_TIMEOUT, self.relay.write(chunk)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("relay write failed: {:?}", e);
                    return;
                }
                Err(_) => {
                    warn!("relay write timed out");
                    return;
                }
            }
        }
    }

    /// Press and release one key (then space for a dead key), then wait
    /// `delay_ms`.
    ///
    /// # Errors
    ///
    /// [`KeyboardError::NotReady`] when the host has not configured us,
    /// [`KeyboardError::Io`] when a report cannot be written.
    pub async fn type_key(
        &mut self,
        key: u8,
        dead_key: bool,
        delay_ms: u16,
    ) -> Result<(), KeyboardError> {
        if !is_configured() {
            return Err(KeyboardError::NotReady);
        }
        self.tap(press_report(key)).await?;
        if dead_key {
            self.tap(press_report(KEYCODE_SPACE)).await?;
        }
        Timer::after_millis(u64::from(delay_ms)).await;
        Ok(())
    }

    async fn tap(&mut self, press: KeyboardReport) -> Result<(), KeyboardError> {
        self.write_keyboard(&press).await?;
        self.write_keyboard(&release_report()).await
    }

    async fn write_keyboard(&mut self, report: &KeyboardReport) -> Result<(), KeyboardError> {
        let bytes = keyboard_report_bytes(report);
        match with_timeout(WRITE_TIMEOUT, self.keyboard.write(&bytes)).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(KeyboardError::Io),
        }
    }
}

fn press_report(key: u8) -> KeyboardReport {
    let mut modifier = 0;
    if key & KEY_SHIFT != 0 {
        modifier |= MOD_LEFT_SHIFT;
    }
    if key & KEY_ALTGR != 0 {
        modifier |= MOD_RIGHT_ALT;
    }
    KeyboardReport {
        modifier,
        reserved: 0,
        leds: 0,
        keycodes: [key & KEY_CODE_MASK, 0, 0, 0, 0, 0],
    }
}

fn release_report() -> KeyboardReport {
    KeyboardReport {
        modifier: 0,
        reserved: 0,
        leds: 0,
        keycodes: [0; 6],
    }
}

/// Input report layout; `leds` belongs to the output report.
fn keyboard_report_bytes(report: &KeyboardReport) -> [u8; KEYBOARD_REPORT_SIZE] {
    let mut bytes = [0u8; KEYBOARD_REPORT_SIZE];
    bytes[0] = report.modifier;
    bytes[1] = report.reserved;
    bytes[2..].copy_from_slice(&report.keycodes);
    bytes
}

/// Configure both HID classes in the USB builder.
pub fn configure_usb_hid(
    builder: &mut Builder<'static, UsbDriver>,
    relay_state: &'static mut State<'static>,
    keyboard_state: &'static mut State<'static>,
    status_handler: &'static mut DeviceStatusHandler,
) -> UsbHid {
    let relay_config = embassy_usb::class::hid::Config {
        report_descriptor: RELAY_REPORT_DESCRIPTOR,
        request_handler: Some(status_handler),
        poll_ms: 1,
        max_packet_size: RELAY_REPORT_SIZE as u16,
        hid_subclass: embassy_usb::class::hid::HidSubclass::No,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::None,
    };
    let keyboard_config = embassy_usb::class::hid::Config {
        report_descriptor: KeyboardReport::desc(),
        request_handler: None,
        poll_ms: 10,
        max_packet_size: KEYBOARD_REPORT_SIZE as u16,
        hid_subclass: embassy_usb::class::hid::HidSubclass::Boot,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::Keyboard,
    };

    UsbHid {
        relay: HidWriter::new(builder, relay_state, relay_config),
        keyboard: HidWriter::new(builder, keyboard_state, keyboard_config),
    }
}
