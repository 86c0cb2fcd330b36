#![no_std]
#![no_main]

use auxlink_rp2040::{
    configure_usb_hid, receive_loop, take_bootloader_request, usb_loop, Board, BoardPins,
    Charger, DeviceStatusHandler, LinkEngine, System, UartTransport, UsbHandler, LINK_BAUDRATE,
};
use defmt::{info, warn};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::adc::{self, Adc, Config as AdcConfig};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::{UART1, USB};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_rp::uart::{Async, Config as UartConfig, Uart, UartRx};
use embassy_rp::usb::Driver;
use embassy_rp::watchdog::Watchdog;
use embassy_time::Timer;
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    UART1_IRQ => embassy_rp::uart::InterruptHandler<UART1>;
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
    ADC_IRQ_FIFO => embassy_rp::adc::InterruptHandler;
});

const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Frame reception runs here, above the link task.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

/// USB device configuration buffers.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// HID state, one per interface.
static RELAY_STATE: StaticCell<State> = StaticCell::new();
static KEYBOARD_STATE: StaticCell<State> = StaticCell::new();
static STATUS_HANDLER: StaticCell<DeviceStatusHandler> = StaticCell::new();
static USB_HANDLER: StaticCell<UsbHandler> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("auxlink starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    let mut watchdog = Watchdog::new(p.WATCHDOG);
    if take_bootloader_request(&mut watchdog) {
        info!("bootloader requested, rebooting to USB boot");
        embassy_rp::rom_data::reset_to_usb_boot(0, 0);
    }

    let mut flash = Flash::<_, Blocking, FLASH_SIZE>::new_blocking(p.FLASH);
    let mut flash_uid = [0u8; 8];
    if let Err(e) = flash.blocking_unique_id(&mut flash_uid) {
        warn!("flash unique id unavailable: {:?}", e);
    }

    // --- UART Setup ---
    let mut uart_config = UartConfig::default();
    uart_config.baudrate = LINK_BAUDRATE;

    let uart = Uart::new(
        p.UART1,
        p.PIN_8, // TX
        p.PIN_9, // RX
        Irqs,
        p.DMA_CH0,
        p.DMA_CH1,
        uart_config,
    );
    let (tx, rx) = uart.split();

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high_spawner = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high_spawner.spawn(receive_task(rx).unwrap());

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("auxlink");
    usb_config.product = Some("Aux Controller");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );
    builder.handler(USB_HANDLER.init(UsbHandler));

    let usb_hid = configure_usb_hid(
        &mut builder,
        RELAY_STATE.init(State::new()),
        KEYBOARD_STATE.init(State::new()),
        STATUS_HANDLER.init(DeviceStatusHandler),
    );
    let usb_device = builder.build();

    // --- Charge path ---
    let adc = Adc::new(p.ADC, Irqs, AdcConfig::default());
    let charger = Charger::new(
        adc,
        adc::Channel::new_pin(p.PIN_26, Pull::None),
        adc::Channel::new_pin(p.PIN_27, Pull::None),
        Pwm::new_output_a(p.PWM_SLICE0, p.PIN_16, PwmConfig::default()),
        Output::new(p.PIN_14, Level::Low),
        Output::new(p.PIN_15, Level::Low),
    );

    let pins = BoardPins {
        wake_in: Input::new(p.PIN_10, Pull::Up),
        wake_out: Output::new(p.PIN_11, Level::Low),
        peer_awake: Input::new(p.PIN_12, Pull::Down),
        led: Output::new(p.PIN_25, Level::High),
    };
    let board = Board::new(usb_hid, charger, pins, watchdog, flash_uid);
    let engine = LinkEngine::new(UartTransport::new(tx), board);

    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(link_task(engine).unwrap());

    info!("auxlink initialized, waiting for main controller...");
}

/// Receive task - lands frames from the main controller.
#[embassy_executor::task]
async fn receive_task(rx: UartRx<'static, Async>) {
    receive_loop(rx).await
}

/// USB device task - runs the USB stack while attached.
#[embassy_executor::task]
async fn usb_task(device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    usb_loop(device).await
}

/// Link task - drives the engine and the deferred full sleep.
#[embassy_executor::task]
async fn link_task(mut engine: LinkEngine<UartTransport, Board>) {
    engine.start();
    loop {
        engine.poll().await;

        if engine.take_full_sleep_request() {
            info!("full sleep");
            engine.device_mut().enter_standby().await;
            engine.resume_link();
        }

        Timer::after_micros(100).await;
    }
}
