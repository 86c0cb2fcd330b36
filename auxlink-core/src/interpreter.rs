//! Control-channel command handling.
//!
//! One handler per message type, then per command sub-id where the type
//! carries one. Unknown types and sub-ids are consumed without effect.

use auxlink_proto::{
    BleCommand, BleCommandId, BootloaderCommand, Channel, EventId, Frame, KeyboardType,
    MainCommand, MainCommandId, Message, MessageType, PlatformDetails, RadioDetails,
    TypingResult,
};

use crate::engine::Context;
use crate::error::KeyboardError;
use crate::ports::{Device, HidInterface, Keyboard, Transport, TxTest};
use crate::selftest;

/// Symbol code that stands for a character the host layout cannot type.
pub const UNTYPEABLE_SYMBOL: u16 = 0xFFFF;

/// Physical keys behind one keyboard symbol code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Keystrokes {
    /// Nothing to type.
    None,
    /// A single key, possibly a dead key.
    One { key: u8, dead: bool },
    /// A lead key followed by a second key.
    Two { lead: u8, key: u8 },
}

/// Split a symbol code into physical keys.
///
/// Bit 15 marks a dead key when bits 8..15 are clear; otherwise the high
/// byte is a separate lead key typed before the low byte.
#[must_use]
pub const fn decode_symbol(symbol: u16) -> Keystrokes {
    if symbol == UNTYPEABLE_SYMBOL {
        Keystrokes::None
    } else if symbol & 0x7F00 == 0 {
        Keystrokes::One {
            key: symbol as u8,
            dead: symbol & 0x8000 != 0,
        }
    } else {
        Keystrokes::Two {
            lead: (symbol >> 8) as u8,
            key: symbol as u8,
        }
    }
}

pub(crate) async fn handle<T: Transport, D: Device>(ctx: &mut Context<'_, T, D>, frame: &Frame) {
    if frame.is_recovery_marker() {
        warn!("recovery marker received, resetting");
        ctx.device.reset();
        return;
    }

    match frame.message() {
        Message::PlatformDetailsQuery => platform_details(ctx).await,
        Message::ChargeStatusQuery => {
            let status = ctx.device.charge_status();
            ctx.send_encoded(&status).await;
        }
        Message::Bootloader(command) => {
            if command == BootloaderCommand::START_PROGRAMMING {
                info!("bootloader requested");
                ctx.device.set_bootloader_flag();
                ctx.device.reset();
            }
        }
        Message::PingWithInfo => {
            let tx = ctx.prepare_copy(frame).await;
            tx.set_header(MessageType::AUX_MCU_EVENT, 2);
            tx.payload_area_mut()[..2].copy_from_slice(&EventId::IM_HERE.to_le_bytes());
            ctx.send().await;
        }
        Message::KeyboardType(request) => keyboard_type(ctx, &request).await,
        Message::BleCommand(command) => ble_command(ctx, &command).await,
        Message::MainCommand(command) => main_command(ctx, frame, &command).await,
        _ => trace!("ignoring {}", frame.message_type()),
    }
}

async fn platform_details<T: Transport, D: Device>(ctx: &mut Context<'_, T, D>) {
    let (fw_major, fw_minor) = ctx.device.firmware_version();
    let radio = if ctx.control.radio_enabled {
        ctx.device.radio_details()
    } else {
        RadioDetails::default()
    };
    let details = PlatformDetails {
        fw_major,
        fw_minor,
        device_id: ctx.device.device_id(),
        unique_id: ctx.device.unique_id(),
        radio,
    };
    ctx.send_encoded(&details).await;
}

async fn keyboard_type<T: Transport, D: Device>(
    ctx: &mut Context<'_, T, D>,
    request: &KeyboardType<'_>,
) {
    let result = match HidInterface::from_raw(request.interface) {
        Some(interface) => type_symbols(&mut *ctx.device, interface, request).await,
        None => Err(KeyboardError::UnknownInterface),
    };
    if let Err(err) = result {
        warn!("typing stopped: {}", err);
    }
    ctx.send_encoded(&TypingResult {
        success: result.is_ok(),
    })
    .await;
}

async fn type_symbols<K: Keyboard>(
    keyboard: &mut K,
    interface: HidInterface,
    request: &KeyboardType<'_>,
) -> Result<(), KeyboardError> {
    let delay = request.delay_ms;
    for symbol in request.symbols() {
        match decode_symbol(symbol) {
            Keystrokes::None => {}
            Keystrokes::One { key, dead } => {
                keyboard.type_key(interface, key, dead, delay).await?;
            }
            Keystrokes::Two { lead, key } => {
                keyboard.type_key(interface, lead, false, delay).await?;
                keyboard.type_key(interface, key, false, delay).await?;
            }
        }
    }
    Ok(())
}

async fn ble_command<T: Transport, D: Device>(
    ctx: &mut Context<'_, T, D>,
    command: &BleCommand<'_>,
) {
    match command.id {
        BleCommandId::ENABLE => {
            ctx.enable_radio(&command.address());
            ctx.send_event(EventId::BLE_ENABLED, &[]).await;
        }
        BleCommandId::DISABLE => {
            ctx.disable_radio();
            ctx.send_event(EventId::BLE_DISABLED, &[]).await;
        }
        other => trace!("ignoring BLE command {}", other),
    }
}

async fn main_command<T: Transport, D: Device>(
    ctx: &mut Context<'_, T, D>,
    frame: &Frame,
    command: &MainCommand<'_>,
) {
    match command.command {
        MainCommandId::SLEEP => sleep(ctx).await,
        MainCommandId::PING => {
            ctx.prepare_copy(frame).await;
            ctx.send().await;
        }
        MainCommandId::ATTACH_USB => {
            ctx.device.start_using_adc();
            ctx.device.usb_attach();
        }
        MainCommandId::DETACH_USB => {
            ctx.device.clear_usb_enumerated();
            ctx.device.usb_detach();
            ctx.device.stop_charge();
            ctx.device.stop_using_adc();
            ctx.send_event(EventId::USB_DETACHED, &[]).await;
        }
        MainCommandId::NIMH_CHARGE => ctx.device.start_nimh_charge(),
        MainCommandId::STOP_CHARGE => ctx.device.stop_charge(),
        MainCommandId::SET_BATTERY_LEVEL => ctx.device.set_battery_level(command.arg_u8(0)),
        MainCommandId::NO_COMMS_UNAVAILABLE => ctx.device.set_no_comms_unavailable(),
        MainCommandId::TX_SWEEP => ctx.device.tx_test(tx_test_args(command), false),
        MainCommandId::TX_TONE_CONTINUOUS => ctx.device.tx_test(tx_test_args(command), true),
        MainCommandId::TX_TONE_STOP => ctx.device.tx_stop_tone(),
        MainCommandId::FORCE_CHARGE_VOLTAGE => {
            ctx.device.force_charge_voltage(command.arg_u16(0));
        }
        MainCommandId::STOP_FORCED_CHARGE => ctx.device.stop_forced_charge(),
        MainCommandId::FUNCTIONAL_TEST => functional_test(ctx).await,
        MainCommandId::UPDATE_DEVICE_STATUS => ctx.device.update_device_status(command.args),
        other => trace!("ignoring main command {}", other),
    }
}

fn tx_test_args(command: &MainCommand<'_>) -> TxTest {
    TxTest {
        frequency_index_start: command.arg_u16(0),
        frequency_index_end: command.arg_u16(1),
        packet_length: command.arg_u16(2),
    }
}

/// Sleep handshake: acknowledge, take the link down, then either sleep
/// right away or leave the sleep to the owning loop when the radio needs
/// to keep running.
async fn sleep<T: Transport, D: Device>(ctx: &mut Context<'_, T, D>) {
    // The command itself may have been handled early; let it finish landing
    ctx.await_partial_resolution(Channel::Control).await;

    ctx.send_event(EventId::SLEEP_RECEIVED, &[]).await;
    ctx.transport.wait_send_complete().await;
    ctx.transport.stop_receive();

    if ctx.control.radio_enabled {
        debug!("sleep deferred, radio running");
        ctx.control.full_sleep_requested = true;
    } else {
        debug!("entering standby");
        ctx.device.enter_standby().await;
        ctx.restart_receive();
        debug!("awake");
    }
}

async fn functional_test<T: Transport, D: Device>(ctx: &mut Context<'_, T, D>) {
    let config = ctx.config.self_test;
    // Always started with the test address; the BLE enable state is untouched
    ctx.device.radio_start(&config.radio_address);

    let code = match selftest::run(&mut *ctx.device, &config).await {
        Ok(()) => {
            info!("functional test passed");
            0
        }
        Err(failure) => {
            warn!("functional test failed: {}", failure);
            failure.code()
        }
    };
    ctx.send_event(EventId::FUNC_TEST_DONE, &[code]).await;
}
