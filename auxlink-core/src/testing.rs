//! Test doubles for the engine's collaborators.

extern crate std;

use core::cell::{Cell, RefCell};
use core::future::{poll_fn, ready, Future};
use core::task::Poll;
use std::collections::VecDeque;
use std::vec::Vec;

use auxlink_proto::{
    Channel, ChargeStatus, EventId, Frame, MessageType, RadioDetails, FRAME_SIZE,
};

use crate::error::KeyboardError;
use crate::flags::ReceiveFlags;
use crate::ports::{
    Battery, ChargePath, CurrentSense, HidInterface, HidPort, Keyboard, Radio, System, Transport,
    TxTest,
};

/// Control-channel frame with the given type and payload.
pub fn control_frame(message_type: MessageType, payload: &[u8]) -> Frame {
    let mut frame = Frame::zeroed();
    frame.set_message_type(message_type);
    frame.set_payload(payload).unwrap();
    frame
}

/// Event ids of the aux events among `frames`, in order.
pub fn event_ids(frames: Vec<Frame>) -> Vec<EventId> {
    frames
        .iter()
        .filter(|f| f.message_type() == MessageType::AUX_MCU_EVENT)
        .map(|f| EventId::from_le_slice(f.payload()))
        .collect()
}

/// Something the main controller sends once the link is idle.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A complete frame.
    Full(Frame),
    /// A frame of which only the first `n` bytes have arrived so far.
    Prefix(Frame, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLog {
    /// A transmission started; carries the first payload word as an event id.
    Started(EventId),
    /// The previous transmission finished.
    Completed,
}

/// Transport double with a scriptable receive side and a send side whose
/// transmissions stay busy for a configurable number of polls.
pub struct MockTransport {
    flags: ReceiveFlags,
    landing: RefCell<[Frame; 3]>,
    in_flight: RefCell<Frame>,
    received: Cell<usize>,
    control_countdown: Cell<Option<u32>>,
    replies: RefCell<VecDeque<Reply>>,
    receiving: bool,
    receive_starts: u32,
    send_duration: u32,
    busy: u32,
    sent: Vec<Frame>,
    tx_log: Vec<TxLog>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            flags: ReceiveFlags::new(),
            landing: RefCell::new([Frame::zeroed(), Frame::zeroed(), Frame::zeroed()]),
            in_flight: RefCell::new(Frame::zeroed()),
            received: Cell::new(0),
            control_countdown: Cell::new(None),
            replies: RefCell::new(VecDeque::new()),
            receiving: false,
            receive_starts: 0,
            send_duration: 0,
            busy: 0,
            sent: Vec::new(),
            tx_log: Vec::new(),
        }
    }

    /// Land a complete frame in its channel buffer and raise the flag.
    pub fn land(&self, frame: &Frame) {
        let channel = frame.channel();
        self.landing.borrow_mut()[channel.index()].clone_from(frame);
        self.flags.mark_complete(channel);
    }

    /// Make `frame` the frame being received, with `received` bytes in.
    pub fn receive_prefix(&mut self, frame: &Frame, received: usize) {
        self.in_flight.borrow_mut().clone_from(frame);
        self.received.set(received.min(FRAME_SIZE));
    }

    /// Finish receiving the in-flight frame.
    pub fn complete_in_flight(&self) {
        let frame = self.in_flight.borrow().clone();
        self.land(&frame);
        self.in_flight.borrow_mut().clear();
        self.received.set(0);
    }

    /// Finish the in-flight frame on the `n`th query of the control flag.
    pub fn complete_on_control_query(&mut self, n: u32) {
        self.control_countdown.set(Some(n));
    }

    /// Queue a frame from the main controller, delivered once the receive
    /// side is idle.
    pub fn reply_with(&mut self, reply: Reply) {
        self.replies.borrow_mut().push_back(reply);
    }

    /// Keep every transmission busy for `polls` polls of the send slot.
    pub fn set_send_duration(&mut self, polls: u32) {
        self.send_duration = polls;
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.clone()
    }

    pub fn tx_log(&self) -> Vec<TxLog> {
        self.tx_log.clone()
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    pub fn receive_starts(&self) -> u32 {
        self.receive_starts
    }

    fn deliver_next_reply(&self) {
        if self.received.get() != 0 || self.flags.is_complete(Channel::Control) {
            return;
        }
        let next = self.replies.borrow_mut().pop_front();
        match next {
            Some(Reply::Full(frame)) => self.land(&frame),
            Some(Reply::Prefix(frame, n)) => {
                self.in_flight.replace(frame);
                self.received.set(n.min(FRAME_SIZE));
            }
            None => {}
        }
    }
}

impl Transport for MockTransport {
    fn start_receive(&mut self) {
        self.flags.reset();
        self.in_flight.borrow_mut().clear();
        self.received.set(0);
        self.receiving = true;
        self.receive_starts += 1;
    }

    fn stop_receive(&mut self) {
        self.receiving = false;
    }

    async fn send(&mut self, frame: &Frame) {
        self.wait_send_complete().await;
        self.tx_log
            .push(TxLog::Started(EventId::from_le_slice(frame.payload_area())));
        self.sent.push(frame.clone());
        self.busy = self.send_duration;
    }

    fn wait_send_complete(&mut self) -> impl Future<Output = ()> {
        poll_fn(move |cx| {
            if self.busy == 0 {
                return Poll::Ready(());
            }
            self.busy -= 1;
            if self.busy == 0 {
                self.tx_log.push(TxLog::Completed);
            }
            cx.waker().wake_by_ref();
            Poll::Pending
        })
    }

    fn remaining_bytes(&self) -> u16 {
        self.deliver_next_reply();
        (FRAME_SIZE - self.received.get()) as u16
    }

    fn is_fully_received(&self, channel: Channel) -> bool {
        if channel == Channel::Control {
            if let Some(n) = self.control_countdown.get() {
                let n = n.saturating_sub(1);
                if n == 0 {
                    self.control_countdown.set(None);
                    self.complete_in_flight();
                } else {
                    self.control_countdown.set(Some(n));
                }
            }
        }
        self.flags.is_complete(channel)
    }

    fn clear_fully_received(&self, channel: Channel) {
        self.flags.clear(channel);
    }

    fn read_received(&self, channel: Channel, frame: &mut Frame) {
        frame.clone_from(&self.landing.borrow()[channel.index()]);
    }

    fn read_in_flight(&self, dst: &mut [u8]) {
        let n = dst.len();
        dst.copy_from_slice(&self.in_flight.borrow().as_bytes()[..n]);
    }
}

/// Collaborator calls recorded by [`MockDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Relay(HidInterface, Vec<u8>),
    UsbAttach,
    UsbDetach,
    ClearUsbEnumerated,
    UpdateDeviceStatus(Vec<u8>),
    RadioStart([u8; 6]),
    RadioStop,
    RadioDetails,
    SetBatteryLevel(u8),
    TxTest(TxTest, bool),
    TxStopTone,
    StartUsingAdc,
    StopUsingAdc,
    StartNimhCharge,
    StopCharge,
    ForceChargeVoltage(u16),
    StopForcedCharge,
    EnableStepDown(u16),
    SetStepDown(u16),
    DisableStepDown,
    EnableChargePath,
    DisableChargePath,
    TypeKey {
        interface: HidInterface,
        key: u8,
        dead: bool,
        delay_ms: u16,
    },
    Reset,
    SetBootloaderFlag,
    EnterStandby,
    WakePeer,
    NoCommsUnavailable,
    Delay(u32),
}

/// Device double: records calls, serves scripted current-sense samples and
/// runs a clock that moves forward on every read.
pub struct MockDevice {
    calls: Vec<Call>,
    clock: Cell<u64>,
    keys_before_failure: Option<usize>,
    keys_typed: usize,
    pub sdk_version: u32,
    pub charge: ChargeStatus,
    pub sense: VecDeque<CurrentSense>,
    /// Returned once `sense` runs out.
    pub default_sense: CurrentSense,
}

impl MockDevice {
    pub const RADIO_ADDRESS: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            clock: Cell::new(0),
            keys_before_failure: None,
            keys_typed: 0,
            sdk_version: 0x0006_0002,
            charge: ChargeStatus::default(),
            sense: VecDeque::new(),
            default_sense: CurrentSense::default(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.clone()
    }

    /// Type `n` keys successfully, then fail every following one.
    pub fn fail_typing_after(&mut self, n: usize) {
        self.keys_before_failure = Some(n);
    }
}

impl HidPort for MockDevice {
    fn relay(&mut self, interface: HidInterface, payload: &[u8]) -> impl Future<Output = ()> {
        self.calls.push(Call::Relay(interface, payload.to_vec()));
        ready(())
    }

    fn usb_attach(&mut self) {
        self.calls.push(Call::UsbAttach);
    }

    fn usb_detach(&mut self) {
        self.calls.push(Call::UsbDetach);
    }

    fn clear_usb_enumerated(&mut self) {
        self.calls.push(Call::ClearUsbEnumerated);
    }

    fn update_device_status(&mut self, status: &[u8]) {
        self.calls.push(Call::UpdateDeviceStatus(status.to_vec()));
    }
}

impl Radio for MockDevice {
    fn radio_start(&mut self, address: &[u8; 6]) {
        self.calls.push(Call::RadioStart(*address));
    }

    fn radio_stop(&mut self) {
        self.calls.push(Call::RadioStop);
    }

    fn radio_sdk_version(&self) -> u32 {
        self.sdk_version
    }

    fn radio_details(&mut self) -> RadioDetails {
        self.calls.push(Call::RadioDetails);
        RadioDetails {
            lib_major: 6,
            lib_minor: 2,
            address: Self::RADIO_ADDRESS,
            ..RadioDetails::default()
        }
    }

    fn set_battery_level(&mut self, percent: u8) {
        self.calls.push(Call::SetBatteryLevel(percent));
    }

    fn tx_test(&mut self, test: TxTest, continuous: bool) {
        self.calls.push(Call::TxTest(test, continuous));
    }

    fn tx_stop_tone(&mut self) {
        self.calls.push(Call::TxStopTone);
    }
}

impl Battery for MockDevice {
    fn charge_status(&mut self) -> ChargeStatus {
        self.charge
    }

    fn start_using_adc(&mut self) {
        self.calls.push(Call::StartUsingAdc);
    }

    fn stop_using_adc(&mut self) {
        self.calls.push(Call::StopUsingAdc);
    }

    fn start_nimh_charge(&mut self) {
        self.calls.push(Call::StartNimhCharge);
    }

    fn stop_charge(&mut self) {
        self.calls.push(Call::StopCharge);
    }

    fn force_charge_voltage(&mut self, mv: u16) {
        self.calls.push(Call::ForceChargeVoltage(mv));
    }

    fn stop_forced_charge(&mut self) {
        self.calls.push(Call::StopForcedCharge);
    }
}

impl ChargePath for MockDevice {
    fn enable_step_down(&mut self, mv: u16) {
        self.calls.push(Call::EnableStepDown(mv));
    }

    fn set_step_down_voltage(&mut self, mv: u16) {
        self.calls.push(Call::SetStepDown(mv));
    }

    fn disable_step_down(&mut self) {
        self.calls.push(Call::DisableStepDown);
    }

    fn enable_charge_path(&mut self) {
        self.calls.push(Call::EnableChargePath);
    }

    fn disable_charge_path(&mut self) {
        self.calls.push(Call::DisableChargePath);
    }

    fn restart_current_sense(&mut self) {}

    fn sample_current_sense(&mut self) -> impl Future<Output = CurrentSense> {
        ready(self.sense.pop_front().unwrap_or(self.default_sense))
    }
}

impl Keyboard for MockDevice {
    fn type_key(
        &mut self,
        interface: HidInterface,
        key: u8,
        dead_key: bool,
        delay_ms: u16,
    ) -> impl Future<Output = Result<(), KeyboardError>> {
        self.calls.push(Call::TypeKey {
            interface,
            key,
            dead: dead_key,
            delay_ms,
        });
        let result = match self.keys_before_failure {
            Some(n) if self.keys_typed >= n => Err(KeyboardError::Io),
            _ => {
                self.keys_typed += 1;
                Ok(())
            }
        };
        ready(result)
    }
}

impl System for MockDevice {
    fn firmware_version(&self) -> (u16, u16) {
        (1, 4)
    }

    fn device_id(&self) -> u32 {
        0x1001_0305
    }

    fn unique_id(&self) -> [u32; 4] {
        [0xA, 0xB, 0xC, 0xD]
    }

    fn reset(&mut self) {
        self.calls.push(Call::Reset);
    }

    fn set_bootloader_flag(&mut self) {
        self.calls.push(Call::SetBootloaderFlag);
    }

    fn enter_standby(&mut self) -> impl Future<Output = ()> {
        self.calls.push(Call::EnterStandby);
        ready(())
    }

    fn wake_peer_if_needed(&mut self) {
        self.calls.push(Call::WakePeer);
    }

    fn set_no_comms_unavailable(&mut self) {
        self.calls.push(Call::NoCommsUnavailable);
    }

    fn delay_ms(&mut self, ms: u32) -> impl Future<Output = ()> {
        self.calls.push(Call::Delay(ms));
        self.clock.set(self.clock.get() + u64::from(ms));
        ready(())
    }

    fn uptime_ms(&self) -> u64 {
        let now = self.clock.get();
        self.clock.set(now + 1);
        now
    }
}
